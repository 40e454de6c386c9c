//! Consent manager
//!
//! Consent ids cached per (kind, provider, user) for the process lifetime.
//! A miss creates the consent upstream with the fixed permission set of its
//! kind; concurrent misses on one key share a single creation call.

use tracing::{debug, info};

use crate::domain::{Consent, ConsentKind, PaymentRequest};
use crate::provider::{BankProvider, ConsentRequest, ProviderError};
use crate::single_flight::SingleFlightCache;

pub const ACCOUNT_PERMISSIONS: &[&str] =
    &["ReadAccountsDetail", "ReadBalances", "ReadTransactionsDetail"];

pub const PAYMENT_PERMISSIONS: &[&str] = &["CreatePayment", "ReadPayments"];

pub const PRODUCT_AGREEMENT_PERMISSIONS: &[&str] = &[
    "ReadProducts",
    "ReadAgreements",
    "CreateAgreement",
    "CloseAgreement",
];

/// Permissions requested for a consent kind.
pub fn permissions_for(kind: ConsentKind) -> &'static [&'static str] {
    match kind {
        ConsentKind::Account => ACCOUNT_PERMISSIONS,
        ConsentKind::Payment => PAYMENT_PERMISSIONS,
        ConsentKind::ProductAgreement => PRODUCT_AGREEMENT_PERMISSIONS,
    }
}

fn reason_for(kind: ConsentKind) -> &'static str {
    match kind {
        ConsentKind::Account => "Account aggregation",
        ConsentKind::Payment => "Payment initiation",
        ConsentKind::ProductAgreement => "Product agreement management",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsentKey {
    pub kind: ConsentKind,
    pub provider: String,
    pub user_id: String,
}

impl ConsentKey {
    pub fn new(kind: ConsentKind, provider: &str, user_id: &str) -> Self {
        Self {
            kind,
            provider: provider.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsentManager {
    cache: SingleFlightCache<ConsentKey, String>,
}

impl ConsentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached consent id for the key, creating the consent on a miss.
    ///
    /// `payment` is sent with payment consents; it is ignored on a cache hit.
    pub async fn ensure_consent(
        &self,
        provider: &dyn BankProvider,
        kind: ConsentKind,
        user_id: &str,
        payment: Option<&PaymentRequest>,
    ) -> Result<String, ProviderError> {
        let key = ConsentKey::new(kind, provider.code(), user_id);

        self.cache
            .get_or_try_insert_with(key, |id| !id.is_empty(), || async move {
                let request = ConsentRequest {
                    kind,
                    user_id: user_id.to_string(),
                    permissions: permissions_for(kind).iter().map(|p| p.to_string()).collect(),
                    reason: reason_for(kind).to_string(),
                    auto_approved: true,
                    payment: payment.cloned(),
                };

                let consent = provider.create_consent(&request).await?;
                if consent.id.trim().is_empty() {
                    return Err(ProviderError::EmptyConsentId {
                        provider: provider.code().to_string(),
                        kind,
                    });
                }

                info!(
                    provider = %provider.code(),
                    user_id,
                    kind = %kind,
                    consent_id = %consent.id,
                    status = %consent.status,
                    "Created consent"
                );
                Ok(consent.id)
            })
            .await
    }

    pub async fn cached(&self, kind: ConsentKind, provider: &str, user_id: &str) -> Option<String> {
        self.cache
            .get(&ConsentKey::new(kind, provider, user_id))
            .await
            .filter(|id| !id.is_empty())
    }

    pub async fn status(
        &self,
        provider: &dyn BankProvider,
        kind: ConsentKind,
        consent_id: &str,
    ) -> Result<Consent, ProviderError> {
        provider.consent_status(kind, consent_id).await
    }

    /// Drop the consent from the cache, then revoke it at the provider.
    pub async fn revoke(
        &self,
        provider: &dyn BankProvider,
        kind: ConsentKind,
        consent_id: &str,
    ) -> Result<(), ProviderError> {
        let code = provider.code();
        let removed = self
            .cache
            .remove_first_where(|key, id| {
                key.kind == kind && key.provider == code && id == consent_id
            })
            .await;
        if let Some((key, _)) = removed {
            debug!(provider = %code, user_id = %key.user_id, kind = %kind, "Evicted cached consent");
        }

        provider.revoke_consent(kind, consent_id).await?;
        info!(provider = %code, kind = %kind, consent_id, "Revoked consent");
        Ok(())
    }
}
