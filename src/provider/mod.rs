//! Provider module
//!
//! The capability set every banking provider exposes, and the Open-Banking
//! HTTP adapter implementing it.

mod client;
mod error;
pub(crate) mod wire;

pub use client::{
    OpenBankingProvider, AGREEMENT_CONSENT_HEADER, AUTHORIZATION_HEADER, CONSENT_HEADER,
    PAYMENT_CONSENT_HEADER, REQUESTING_BANK_HEADER,
};
pub use error::ProviderError;

use async_trait::async_trait;

use crate::domain::{
    Account, AgreementRequest, Balance, Consent, ConsentKind, DateRange, Payment, PaymentRequest,
    Product, ProductAgreement, Transaction,
};

/// Parameters of a consent creation call.
#[derive(Debug, Clone)]
pub struct ConsentRequest {
    pub kind: ConsentKind,
    pub user_id: String,
    pub permissions: Vec<String>,
    pub reason: String,
    pub auto_approved: bool,
    /// Payment details, for payment consents only
    pub payment: Option<PaymentRequest>,
}

/// Uniform capability interface of a banking provider.
///
/// Implementations own authentication and response normalization; callers
/// only ever see domain types.
#[async_trait]
pub trait BankProvider: Send + Sync {
    /// Short provider code (`vbank`, `abank`...)
    fn code(&self) -> &str;

    async fn create_consent(&self, request: &ConsentRequest) -> Result<Consent, ProviderError>;

    async fn consent_status(
        &self,
        kind: ConsentKind,
        consent_id: &str,
    ) -> Result<Consent, ProviderError>;

    async fn revoke_consent(&self, kind: ConsentKind, consent_id: &str)
        -> Result<(), ProviderError>;

    async fn accounts(&self, consent_id: &str, user_id: &str)
        -> Result<Vec<Account>, ProviderError>;

    async fn account_detail(
        &self,
        consent_id: &str,
        user_id: &str,
        account_id: &str,
    ) -> Result<Account, ProviderError>;

    async fn balances(
        &self,
        consent_id: &str,
        user_id: &str,
        account_id: &str,
    ) -> Result<Vec<Balance>, ProviderError>;

    async fn transactions(
        &self,
        consent_id: &str,
        user_id: &str,
        account_id: &str,
        range: &DateRange,
    ) -> Result<Vec<Transaction>, ProviderError>;

    async fn create_payment(
        &self,
        consent_id: &str,
        user_id: &str,
        request: &PaymentRequest,
    ) -> Result<Payment, ProviderError>;

    async fn payment(
        &self,
        user_id: &str,
        payment_id: &str,
        consent_id: Option<&str>,
    ) -> Result<Payment, ProviderError>;

    async fn products(&self, product_type: Option<&str>) -> Result<Vec<Product>, ProviderError>;

    async fn open_agreement(
        &self,
        consent_id: &str,
        user_id: &str,
        request: &AgreementRequest,
    ) -> Result<ProductAgreement, ProviderError>;

    async fn agreement(
        &self,
        consent_id: &str,
        user_id: &str,
        agreement_id: &str,
    ) -> Result<ProductAgreement, ProviderError>;

    /// Close an agreement. Providers that answer with an empty body yield `None`.
    async fn close_agreement(
        &self,
        consent_id: &str,
        user_id: &str,
        agreement_id: &str,
    ) -> Result<Option<ProductAgreement>, ProviderError>;

    async fn agreements(
        &self,
        consent_id: &str,
        user_id: &str,
    ) -> Result<Vec<ProductAgreement>, ProviderError>;
}
