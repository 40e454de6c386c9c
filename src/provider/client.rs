//! Open-Banking provider adapter
//!
//! Every call obtains a bearer token from the shared [`TokenManager`],
//! adds the requesting-party and consent headers, executes through the
//! provider's [`HttpTransport`] and normalizes the response.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::wire::{
    decode_list, AccountList, AccountWire, AgreementBody, AgreementList, AgreementWire,
    BalanceList, ConsentRequestBody, ConsentWire, Enveloped, PaymentBody, PaymentDetailsBody,
    PaymentWire, ProductList, TransactionList,
};
use super::{BankProvider, ConsentRequest, ProviderError};
use crate::domain::{
    Account, AgreementRequest, Balance, Consent, ConsentKind, DateRange, Payment, PaymentRequest,
    Product, ProductAgreement, Transaction,
};
use crate::token::TokenManager;
use crate::transport::{HttpTransport, TransportRequest, TransportResponse};

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const REQUESTING_BANK_HEADER: &str = "X-Requesting-Bank";
pub const CONSENT_HEADER: &str = "X-Consent-Id";
pub const PAYMENT_CONSENT_HEADER: &str = "X-Payment-Consent-Id";
pub const AGREEMENT_CONSENT_HEADER: &str = "X-Product-Agreement-Consent-Id";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Adapter for one Open-Banking style provider.
#[derive(Debug)]
pub struct OpenBankingProvider {
    transport: HttpTransport,
    tokens: Arc<TokenManager>,
    requesting_party: String,
}

impl OpenBankingProvider {
    pub fn new(
        transport: HttpTransport,
        tokens: Arc<TokenManager>,
        requesting_party: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            tokens,
            requesting_party: requesting_party.into(),
        }
    }

    /// Execute an authenticated call; any non-2xx status is an error.
    async fn call(
        &self,
        operation: &'static str,
        request: TransportRequest,
    ) -> Result<TransportResponse, ProviderError> {
        let token = self.tokens.ensure_token(&self.transport).await?;
        let request = request
            .with_header(AUTHORIZATION_HEADER, format!("Bearer {}", token))
            .with_header(REQUESTING_BANK_HEADER, self.requesting_party.as_str());

        let response = self
            .transport
            .execute(&request)
            .await
            .map_err(|err| ProviderError::transport(self.code(), operation, err))?;

        if response.is_success() {
            return Ok(response);
        }

        if response.status == 401 {
            warn!(provider = %self.code(), operation, "Provider rejected bearer token");
            self.tokens.invalidate(self.code()).await;
        }

        Err(ProviderError::Status {
            provider: self.code().to_string(),
            operation,
            status: response.status,
            body: response.preview(),
        })
    }

    fn decode<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        response: &TransportResponse,
    ) -> Result<T, ProviderError> {
        response
            .decode::<Enveloped<T>>()
            .map(Enveloped::into_inner)
            .map_err(|err| ProviderError::decode(self.code(), operation, err))
    }

    fn with_body<T: serde::Serialize>(
        &self,
        operation: &'static str,
        request: TransportRequest,
        body: &T,
    ) -> Result<TransportRequest, ProviderError> {
        request
            .with_json(body)
            .map_err(|err| ProviderError::transport(self.code(), operation, err))
    }

    fn consent_request(method: Method, kind: ConsentKind, consent_id: &str) -> TransportRequest {
        TransportRequest::new(method, kind.resource()).with_segment(consent_id)
    }
}

#[async_trait]
impl BankProvider for OpenBankingProvider {
    fn code(&self) -> &str {
        self.transport.provider()
    }

    async fn create_consent(&self, request: &ConsentRequest) -> Result<Consent, ProviderError> {
        const OP: &str = "create consent";
        let body = ConsentRequestBody {
            requesting_bank: &self.requesting_party,
            client_id: &request.user_id,
            permissions: &request.permissions,
            reason: &request.reason,
            auto_approved: request.auto_approved,
            payment_details: request.payment.as_ref().map(PaymentDetailsBody::from),
        };
        let http = self.with_body(
            OP,
            TransportRequest::post(request.kind.resource()).with_segment("request"),
            &body,
        )?;

        let response = self.call(OP, http).await?;
        let wire: ConsentWire = self.decode(OP, &response)?;
        Ok(wire.into_domain(self.code(), request.kind))
    }

    async fn consent_status(
        &self,
        kind: ConsentKind,
        consent_id: &str,
    ) -> Result<Consent, ProviderError> {
        const OP: &str = "consent status";
        let response = self
            .call(OP, Self::consent_request(Method::GET, kind, consent_id))
            .await?;
        let wire: ConsentWire = self.decode(OP, &response)?;

        let mut consent = wire.into_domain(self.code(), kind);
        if consent.id.is_empty() {
            consent.id = consent_id.to_string();
        }
        Ok(consent)
    }

    async fn revoke_consent(
        &self,
        kind: ConsentKind,
        consent_id: &str,
    ) -> Result<(), ProviderError> {
        self.call(
            "revoke consent",
            Self::consent_request(Method::DELETE, kind, consent_id),
        )
        .await?;
        Ok(())
    }

    async fn accounts(
        &self,
        consent_id: &str,
        user_id: &str,
    ) -> Result<Vec<Account>, ProviderError> {
        let request = TransportRequest::get("/accounts")
            .with_query("client_id", user_id)
            .with_header(CONSENT_HEADER, consent_id);
        let response = self.call("accounts", request).await?;

        Ok(decode_list::<AccountList>(&response.body)
            .into_iter()
            .map(|wire| wire.into_domain(self.code()))
            .collect())
    }

    async fn account_detail(
        &self,
        consent_id: &str,
        user_id: &str,
        account_id: &str,
    ) -> Result<Account, ProviderError> {
        const OP: &str = "account detail";
        let request = TransportRequest::get("/accounts")
            .with_segment(account_id)
            .with_query("client_id", user_id)
            .with_header(CONSENT_HEADER, consent_id);
        let response = self.call(OP, request).await?;

        // Detail responses come either as a one-element list or as a bare object
        let wire = match decode_list::<AccountList>(&response.body).into_iter().next() {
            Some(wire) => wire,
            None => self.decode::<AccountWire>(OP, &response)?,
        };

        let mut account = wire.into_domain(self.code());
        if account.id.is_empty() {
            account.id = account_id.to_string();
        }
        if account.ext_id.is_empty() {
            account.ext_id = account.id.clone();
        }
        Ok(account)
    }

    async fn balances(
        &self,
        consent_id: &str,
        user_id: &str,
        account_id: &str,
    ) -> Result<Vec<Balance>, ProviderError> {
        let request = TransportRequest::get("/accounts")
            .with_segment(account_id)
            .with_segment("balances")
            .with_query("client_id", user_id)
            .with_header(CONSENT_HEADER, consent_id);
        let response = self.call("balances", request).await?;

        Ok(decode_list::<BalanceList>(&response.body)
            .into_iter()
            .map(|wire| wire.into_domain(self.code(), account_id))
            .collect())
    }

    async fn transactions(
        &self,
        consent_id: &str,
        user_id: &str,
        account_id: &str,
        range: &DateRange,
    ) -> Result<Vec<Transaction>, ProviderError> {
        let mut request = TransportRequest::get("/accounts")
            .with_segment(account_id)
            .with_segment("transactions")
            .with_query("client_id", user_id)
            .with_header(CONSENT_HEADER, consent_id);
        if let Some(from) = range.from {
            request = request.with_query("from_date", from.format(DATE_FORMAT).to_string());
        }
        if let Some(to) = range.to {
            request = request.with_query("to_date", to.format(DATE_FORMAT).to_string());
        }
        let response = self.call("transactions", request).await?;

        Ok(decode_list::<TransactionList>(&response.body)
            .into_iter()
            .map(|wire| wire.into_domain(self.code(), account_id))
            .collect())
    }

    async fn create_payment(
        &self,
        consent_id: &str,
        user_id: &str,
        request: &PaymentRequest,
    ) -> Result<Payment, ProviderError> {
        const OP: &str = "create payment";
        let http = TransportRequest::post("/payments")
            .with_query("client_id", user_id)
            .with_header(PAYMENT_CONSENT_HEADER, consent_id);
        let http = self.with_body(OP, http, &PaymentBody::from(request))?;

        let response = self.call(OP, http).await?;
        let wire: PaymentWire = self.decode(OP, &response)?;

        let mut payment = wire.into_domain(self.code());
        // Providers often echo only id and status
        if payment.amount.is_zero() {
            payment.amount = request.amount;
        }
        if payment.currency.is_empty() {
            payment.currency = request.currency.clone();
        }
        if payment.debtor_account.is_empty() {
            payment.debtor_account = request.debtor_account.clone();
        }
        if payment.creditor_account.is_empty() {
            payment.creditor_account = request.creditor_account.clone();
        }
        if payment.reference.is_empty() {
            payment.reference = request.reference.clone().unwrap_or_default();
        }
        Ok(payment)
    }

    async fn payment(
        &self,
        user_id: &str,
        payment_id: &str,
        consent_id: Option<&str>,
    ) -> Result<Payment, ProviderError> {
        const OP: &str = "payment status";
        let mut request = TransportRequest::get("/payments")
            .with_segment(payment_id)
            .with_query("client_id", user_id);
        if let Some(consent_id) = consent_id {
            request = request.with_header(PAYMENT_CONSENT_HEADER, consent_id);
        }
        let response = self.call(OP, request).await?;
        let wire: PaymentWire = self.decode(OP, &response)?;

        let mut payment = wire.into_domain(self.code());
        if payment.id.is_empty() {
            payment.id = payment_id.to_string();
        }
        Ok(payment)
    }

    async fn products(&self, product_type: Option<&str>) -> Result<Vec<Product>, ProviderError> {
        let mut request = TransportRequest::get("/products");
        if let Some(product_type) = product_type.filter(|t| !t.is_empty()) {
            request = request.with_query("product_type", product_type);
        }
        let response = self.call("products", request).await?;

        Ok(decode_list::<ProductList>(&response.body)
            .into_iter()
            .map(|wire| wire.into_domain(self.code()))
            .collect())
    }

    async fn open_agreement(
        &self,
        consent_id: &str,
        user_id: &str,
        request: &AgreementRequest,
    ) -> Result<ProductAgreement, ProviderError> {
        const OP: &str = "open agreement";
        let http = TransportRequest::post("/agreements")
            .with_query("client_id", user_id)
            .with_header(AGREEMENT_CONSENT_HEADER, consent_id);
        let http = self.with_body(OP, http, &AgreementBody::from(request))?;

        let response = self.call(OP, http).await?;
        let wire: AgreementWire = self.decode(OP, &response)?;

        let mut agreement = wire.into_domain(self.code());
        if agreement.product_id.is_empty() {
            agreement.product_id = request.product_id.clone();
        }
        if agreement.amount.is_zero() {
            agreement.amount = request.amount;
        }
        Ok(agreement)
    }

    async fn agreement(
        &self,
        consent_id: &str,
        user_id: &str,
        agreement_id: &str,
    ) -> Result<ProductAgreement, ProviderError> {
        const OP: &str = "agreement";
        let request = TransportRequest::get("/agreements")
            .with_segment(agreement_id)
            .with_query("client_id", user_id)
            .with_header(AGREEMENT_CONSENT_HEADER, consent_id);
        let response = self.call(OP, request).await?;
        let wire: AgreementWire = self.decode(OP, &response)?;

        let mut agreement = wire.into_domain(self.code());
        if agreement.id.is_empty() {
            agreement.id = agreement_id.to_string();
        }
        Ok(agreement)
    }

    async fn close_agreement(
        &self,
        consent_id: &str,
        user_id: &str,
        agreement_id: &str,
    ) -> Result<Option<ProductAgreement>, ProviderError> {
        const OP: &str = "close agreement";
        let request = TransportRequest::delete("/agreements")
            .with_segment(agreement_id)
            .with_query("client_id", user_id)
            .with_header(AGREEMENT_CONSENT_HEADER, consent_id);
        let response = self.call(OP, request).await?;

        if response.body.is_empty() {
            return Ok(None);
        }
        let wire: AgreementWire = self.decode(OP, &response)?;
        Ok(Some(wire.into_domain(self.code())))
    }

    async fn agreements(
        &self,
        consent_id: &str,
        user_id: &str,
    ) -> Result<Vec<ProductAgreement>, ProviderError> {
        let request = TransportRequest::get("/agreements")
            .with_query("client_id", user_id)
            .with_header(AGREEMENT_CONSENT_HEADER, consent_id);
        let response = self.call("agreements", request).await?;

        Ok(decode_list::<AgreementList>(&response.body)
            .into_iter()
            .map(|wire| wire.into_domain(self.code()))
            .collect())
    }
}
