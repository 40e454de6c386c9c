//! Transport module
//!
//! Provider-agnostic HTTP execution with retries and response validation.

mod client;
mod error;

pub use client::{HttpTransport, RetryPolicy, TransportRequest, TransportResponse};
pub use error::TransportError;
