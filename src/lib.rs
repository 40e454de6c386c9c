//! bank_aggregator Library
//!
//! Re-exports modules for integration testing and external use.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod consent;
pub mod domain;
pub mod error;
pub mod provider;
pub mod single_flight;
pub mod token;
pub mod transport;

pub use aggregator::{AggregatorError, BankAggregator};
pub use config::{Config, ConfigError};
pub use domain::{
    Account, Balance, ConsentKind, DateRange, OperationContext, Payment, PaymentRequest,
    ProductAgreement, ProviderFilter, Transaction,
};
pub use error::{AppError, AppResult};
pub use provider::{BankProvider, OpenBankingProvider, ProviderError};
