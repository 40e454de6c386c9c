//! Domain module
//!
//! Canonical entities, amount normalization, query filters and the
//! per-operation context.

pub mod amount;
pub mod context;
pub mod filter;
pub mod models;

pub use amount::{parse_amount, signed_amount, CreditDebit};
pub use context::{Interrupted, OperationContext};
pub use filter::{DateRange, ProviderFilter};
pub use models::{
    Account, AgreementRequest, Balance, Consent, ConsentKind, Payment, PaymentRequest, Product,
    ProductAgreement, Transaction,
};
