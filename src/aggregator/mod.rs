//! Aggregator module
//!
//! Orchestrates consents and provider calls across the configured provider
//! set, with per-provider failure isolation for multi-provider reads.

mod error;
mod service;

pub use error::AggregatorError;
pub use service::BankAggregator;
