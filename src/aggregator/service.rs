//! Bank aggregator service
//!
//! Every public operation takes an [`OperationContext`] and runs under its
//! deadline and cancellation signal. Multi-provider reads fan out with one
//! future per provider, joined before merging in configuration order; a
//! failing provider is logged and skipped. Targeted calls propagate the
//! provider's error as is.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::error::AggregatorError;
use crate::config::Config;
use crate::consent::ConsentManager;
use crate::domain::{
    Account, AgreementRequest, Balance, Consent, ConsentKind, DateRange, OperationContext,
    Payment, PaymentRequest, Product, ProductAgreement, ProviderFilter, Transaction,
};
use crate::provider::{BankProvider, OpenBankingProvider, ProviderError};
use crate::token::{ClientCredentials, TokenManager};
use crate::transport::HttpTransport;

/// Whether a per-account failure inside one provider aborts that provider's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountFailures {
    Skip,
    Propagate,
}

pub struct BankAggregator {
    providers: Vec<Arc<dyn BankProvider>>,
    consents: ConsentManager,
}

impl BankAggregator {
    /// Create an aggregator over `providers`, fanned out in the given order
    pub fn new(providers: Vec<Arc<dyn BankProvider>>) -> Self {
        Self {
            providers,
            consents: ConsentManager::new(),
        }
    }

    /// Build Open-Banking adapters for every configured provider.
    ///
    /// All adapters share one HTTP client and one token cache.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        let tokens = Arc::new(TokenManager::new(ClientCredentials::new(
            config.team_id.as_str(),
            config.client_secret.as_str(),
        )));

        let providers = config
            .providers
            .iter()
            .map(|provider| {
                let transport = HttpTransport::new(
                    provider.code.as_str(),
                    provider.base_url.as_str(),
                    client.clone(),
                    config.retry,
                );
                Arc::new(OpenBankingProvider::new(
                    transport,
                    tokens.clone(),
                    config.team_id.as_str(),
                )) as Arc<dyn BankProvider>
            })
            .collect();

        Ok(Self::new(providers))
    }

    pub fn provider_codes(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.code()).collect()
    }

    pub fn consents(&self) -> &ConsentManager {
        &self.consents
    }

    fn provider(&self, code: &str) -> Result<&Arc<dyn BankProvider>, AggregatorError> {
        self.providers
            .iter()
            .find(|p| p.code().eq_ignore_ascii_case(code.trim()))
            .ok_or_else(|| AggregatorError::UnknownProvider(code.to_string()))
    }

    /// Run `fetch` against every provider concurrently and merge in
    /// configuration order. Fails only when every provider failed.
    async fn fan_out<T, F, Fut>(
        &self,
        operation: &'static str,
        fetch: F,
    ) -> Result<Vec<T>, AggregatorError>
    where
        F: Fn(Arc<dyn BankProvider>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, ProviderError>>,
    {
        let results = join_all(self.providers.iter().cloned().map(&fetch)).await;

        let mut merged = Vec::new();
        let mut failures = Vec::new();
        for (provider, result) in self.providers.iter().zip(results) {
            match result {
                Ok(items) => merged.extend(items),
                Err(err) => {
                    warn!(provider = %provider.code(), operation, error = %err, "Provider failed, skipping");
                    failures.push(err);
                }
            }
        }

        if !self.providers.is_empty() && failures.len() == self.providers.len() {
            return Err(AggregatorError::AllProvidersFailed {
                operation,
                failures,
            });
        }
        Ok(merged)
    }

    // =====================================================================
    // Consents
    // =====================================================================

    /// Ensure a consent of `kind` exists for the user at one provider
    pub async fn ensure_consent(
        &self,
        ctx: &OperationContext,
        provider: &str,
        user_id: &str,
        kind: ConsentKind,
    ) -> Result<String, AggregatorError> {
        let provider = self.provider(provider)?;
        let consent = ctx
            .guard(
                self.consents
                    .ensure_consent(provider.as_ref(), kind, user_id, None),
            )
            .await??;
        Ok(consent)
    }

    pub async fn consent_status(
        &self,
        ctx: &OperationContext,
        provider: &str,
        kind: ConsentKind,
        consent_id: &str,
    ) -> Result<Consent, AggregatorError> {
        let provider = self.provider(provider)?;
        let consent = ctx
            .guard(self.consents.status(provider.as_ref(), kind, consent_id))
            .await??;
        Ok(consent)
    }

    /// Evict the consent from the cache and revoke it at the provider
    pub async fn revoke_consent(
        &self,
        ctx: &OperationContext,
        provider: &str,
        kind: ConsentKind,
        consent_id: &str,
    ) -> Result<(), AggregatorError> {
        let provider = self.provider(provider)?;
        ctx.guard(self.consents.revoke(provider.as_ref(), kind, consent_id))
            .await??;
        Ok(())
    }

    // =====================================================================
    // Accounts
    // =====================================================================

    async fn accounts_from(
        &self,
        provider: &dyn BankProvider,
        user_id: &str,
    ) -> Result<Vec<Account>, ProviderError> {
        let consent = self
            .consents
            .ensure_consent(provider, ConsentKind::Account, user_id, None)
            .await?;
        let accounts = provider.accounts(&consent, user_id).await?;
        info!(provider = %provider.code(), user_id, count = accounts.len(), "Fetched accounts");
        Ok(accounts)
    }

    async fn collect_accounts(
        &self,
        user_id: &str,
        filter: &ProviderFilter,
    ) -> Result<Vec<Account>, AggregatorError> {
        match filter {
            ProviderFilter::Only(code) => {
                let provider = self.provider(code)?;
                Ok(self.accounts_from(provider.as_ref(), user_id).await?)
            }
            ProviderFilter::All => {
                let accounts = self
                    .fan_out("accounts", |provider| async move {
                        self.accounts_from(provider.as_ref(), user_id).await
                    })
                    .await?;
                info!(
                    user_id,
                    count = accounts.len(),
                    providers = self.providers.len(),
                    "Aggregated accounts"
                );
                Ok(accounts)
            }
        }
    }

    /// Accounts of one provider or of every provider
    pub async fn get_accounts(
        &self,
        ctx: &OperationContext,
        user_id: &str,
        filter: &ProviderFilter,
    ) -> Result<Vec<Account>, AggregatorError> {
        ctx.guard(self.collect_accounts(user_id, filter)).await?
    }

    pub async fn get_account_detail(
        &self,
        ctx: &OperationContext,
        provider: &str,
        user_id: &str,
        account_id: &str,
    ) -> Result<Account, AggregatorError> {
        let provider = self.provider(provider)?;
        let account = ctx
            .guard(async {
                let consent = self
                    .consents
                    .ensure_consent(provider.as_ref(), ConsentKind::Account, user_id, None)
                    .await?;
                provider.account_detail(&consent, user_id, account_id).await
            })
            .await??;
        Ok(account)
    }

    pub async fn get_account_balances(
        &self,
        ctx: &OperationContext,
        provider: &str,
        user_id: &str,
        account_id: &str,
    ) -> Result<Vec<Balance>, AggregatorError> {
        let provider = self.provider(provider)?;
        let balances = ctx
            .guard(async {
                let consent = self
                    .consents
                    .ensure_consent(provider.as_ref(), ConsentKind::Account, user_id, None)
                    .await?;
                provider.balances(&consent, user_id, account_id).await
            })
            .await??;
        Ok(balances)
    }

    // =====================================================================
    // Transactions
    // =====================================================================

    /// List a provider's accounts, then each account's transactions.
    async fn transactions_from(
        &self,
        provider: &dyn BankProvider,
        user_id: &str,
        range: &DateRange,
        account_failures: AccountFailures,
    ) -> Result<Vec<Transaction>, ProviderError> {
        let consent = self
            .consents
            .ensure_consent(provider, ConsentKind::Account, user_id, None)
            .await?;
        let accounts = provider.accounts(&consent, user_id).await?;

        let mut transactions = Vec::new();
        for account in &accounts {
            match provider
                .transactions(&consent, user_id, &account.id, range)
                .await
            {
                Ok(items) => transactions.extend(items),
                Err(err) if account_failures == AccountFailures::Skip => {
                    warn!(
                        provider = %provider.code(),
                        account_id = %account.id,
                        error = %err,
                        "Failed to fetch account transactions, skipping account"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(transactions)
    }

    async fn collect_transactions(
        &self,
        user_id: &str,
        filter: &ProviderFilter,
        range: &DateRange,
    ) -> Result<Vec<Transaction>, AggregatorError> {
        let transactions = match filter {
            ProviderFilter::Only(code) => {
                let provider = self.provider(code)?;
                self.transactions_from(
                    provider.as_ref(),
                    user_id,
                    range,
                    AccountFailures::Propagate,
                )
                .await?
            }
            ProviderFilter::All => {
                self.fan_out("transactions", |provider| async move {
                    self.transactions_from(provider.as_ref(), user_id, range, AccountFailures::Skip)
                        .await
                })
                .await?
            }
        };

        let transactions = range.retain(transactions);
        info!(user_id, count = transactions.len(), "Aggregated transactions");
        Ok(transactions)
    }

    /// Transactions across accounts of one or every provider, filtered to `range`
    pub async fn get_transactions(
        &self,
        ctx: &OperationContext,
        user_id: &str,
        filter: &ProviderFilter,
        range: &DateRange,
    ) -> Result<Vec<Transaction>, AggregatorError> {
        ctx.guard(self.collect_transactions(user_id, filter, range))
            .await?
    }

    pub async fn get_account_transactions(
        &self,
        ctx: &OperationContext,
        provider: &str,
        user_id: &str,
        account_id: &str,
        range: &DateRange,
    ) -> Result<Vec<Transaction>, AggregatorError> {
        let provider = self.provider(provider)?;
        let transactions = ctx
            .guard(async {
                let consent = self
                    .consents
                    .ensure_consent(provider.as_ref(), ConsentKind::Account, user_id, None)
                    .await?;
                provider
                    .transactions(&consent, user_id, account_id, range)
                    .await
            })
            .await??;
        Ok(range.retain(transactions))
    }

    // =====================================================================
    // Payments
    // =====================================================================

    /// Ensure a payment consent carrying the payment details, then initiate the payment
    pub async fn create_payment(
        &self,
        ctx: &OperationContext,
        provider: &str,
        user_id: &str,
        request: &PaymentRequest,
    ) -> Result<Payment, AggregatorError> {
        let provider = self.provider(provider)?;
        let payment = ctx
            .guard(async {
                let consent = self
                    .consents
                    .ensure_consent(provider.as_ref(), ConsentKind::Payment, user_id, Some(request))
                    .await?;
                provider.create_payment(&consent, user_id, request).await
            })
            .await??;

        info!(
            provider = %provider.code(),
            user_id,
            payment_id = %payment.id,
            status = %payment.status,
            "Created payment"
        );
        Ok(payment)
    }

    pub async fn get_payment(
        &self,
        ctx: &OperationContext,
        provider: &str,
        user_id: &str,
        payment_id: &str,
    ) -> Result<Payment, AggregatorError> {
        let provider = self.provider(provider)?;
        let payment = ctx
            .guard(async {
                let consent = self
                    .consents
                    .cached(ConsentKind::Payment, provider.code(), user_id)
                    .await;
                provider
                    .payment(user_id, payment_id, consent.as_deref())
                    .await
            })
            .await??;
        Ok(payment)
    }

    // =====================================================================
    // Products & agreements
    // =====================================================================

    async fn collect_products(
        &self,
        filter: &ProviderFilter,
        product_type: Option<&str>,
    ) -> Result<Vec<Product>, AggregatorError> {
        match filter {
            ProviderFilter::Only(code) => {
                let provider = self.provider(code)?;
                Ok(provider.products(product_type).await?)
            }
            ProviderFilter::All => {
                self.fan_out("products", |provider| async move {
                    provider.products(product_type).await
                })
                .await
            }
        }
    }

    /// Product catalogue of one or every provider. Needs no consent.
    pub async fn list_products(
        &self,
        ctx: &OperationContext,
        filter: &ProviderFilter,
        product_type: Option<&str>,
    ) -> Result<Vec<Product>, AggregatorError> {
        ctx.guard(self.collect_products(filter, product_type))
            .await?
    }

    async fn agreement_consent(
        &self,
        provider: &dyn BankProvider,
        user_id: &str,
    ) -> Result<String, ProviderError> {
        self.consents
            .ensure_consent(provider, ConsentKind::ProductAgreement, user_id, None)
            .await
    }

    pub async fn open_agreement(
        &self,
        ctx: &OperationContext,
        provider: &str,
        user_id: &str,
        request: &AgreementRequest,
    ) -> Result<ProductAgreement, AggregatorError> {
        let provider = self.provider(provider)?;
        let agreement = ctx
            .guard(async {
                let consent = self.agreement_consent(provider.as_ref(), user_id).await?;
                provider.open_agreement(&consent, user_id, request).await
            })
            .await??;

        info!(
            provider = %provider.code(),
            user_id,
            agreement_id = %agreement.id,
            product_id = %request.product_id,
            "Opened agreement"
        );
        Ok(agreement)
    }

    pub async fn get_agreement(
        &self,
        ctx: &OperationContext,
        provider: &str,
        user_id: &str,
        agreement_id: &str,
    ) -> Result<ProductAgreement, AggregatorError> {
        let provider = self.provider(provider)?;
        let agreement = ctx
            .guard(async {
                let consent = self.agreement_consent(provider.as_ref(), user_id).await?;
                provider.agreement(&consent, user_id, agreement_id).await
            })
            .await??;
        Ok(agreement)
    }

    pub async fn close_agreement(
        &self,
        ctx: &OperationContext,
        provider: &str,
        user_id: &str,
        agreement_id: &str,
    ) -> Result<Option<ProductAgreement>, AggregatorError> {
        let provider = self.provider(provider)?;
        let closed = ctx
            .guard(async {
                let consent = self.agreement_consent(provider.as_ref(), user_id).await?;
                provider.close_agreement(&consent, user_id, agreement_id).await
            })
            .await??;

        info!(provider = %provider.code(), user_id, agreement_id, "Closed agreement");
        Ok(closed)
    }

    async fn collect_agreements(
        &self,
        user_id: &str,
        filter: &ProviderFilter,
    ) -> Result<Vec<ProductAgreement>, AggregatorError> {
        match filter {
            ProviderFilter::Only(code) => {
                let provider = self.provider(code)?;
                let consent = self.agreement_consent(provider.as_ref(), user_id).await?;
                Ok(provider.agreements(&consent, user_id).await?)
            }
            ProviderFilter::All => {
                self.fan_out("agreements", |provider| async move {
                    let consent = self.agreement_consent(provider.as_ref(), user_id).await?;
                    provider.agreements(&consent, user_id).await
                })
                .await
            }
        }
    }

    /// Agreements of one or every provider
    pub async fn list_agreements(
        &self,
        ctx: &OperationContext,
        user_id: &str,
        filter: &ProviderFilter,
    ) -> Result<Vec<ProductAgreement>, AggregatorError> {
        ctx.guard(self.collect_agreements(user_id, filter)).await?
    }
}
