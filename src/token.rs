//! Token manager
//!
//! Per-provider bearer tokens obtained with client credentials and cached
//! until they come within `REFRESH_MARGIN_SECS` of their stated expiry.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::provider::ProviderError;
use crate::single_flight::SingleFlightCache;
use crate::transport::{HttpTransport, TransportRequest};

/// Tokens this many seconds from expiry are treated as already expired.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Upper bound on a provider-stated token lifetime.
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

const TOKEN_PATH: &str = "/auth/bank-token";

/// Cached bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS)
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

/// Client credentials presented to every provider's token endpoint.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default, alias = "accessToken")]
    access_token: String,
    #[serde(default, alias = "tokenType")]
    token_type: Option<String>,
    /// Seconds; absent means the token must be refreshed on next use
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<i64>,
}

/// Token cache shared by all provider adapters.
#[derive(Debug)]
pub struct TokenManager {
    credentials: ClientCredentials,
    cache: SingleFlightCache<String, AccessToken>,
}

impl TokenManager {
    pub fn new(credentials: ClientCredentials) -> Self {
        Self {
            credentials,
            cache: SingleFlightCache::new(),
        }
    }

    /// Bearer token for the transport's provider, refreshing it when needed.
    ///
    /// Concurrent callers for one provider share a single refresh.
    pub async fn ensure_token(&self, transport: &HttpTransport) -> Result<String, ProviderError> {
        let provider = transport.provider().to_string();
        let token = self
            .cache
            .get_or_try_insert_with(
                provider,
                |token| token.is_fresh(),
                || self.fetch_token(transport),
            )
            .await?;
        Ok(token.value)
    }

    /// Forget the cached token so the next call re-authenticates.
    pub async fn invalidate(&self, provider: &str) {
        if self.cache.remove(&provider.to_string()).await.is_some() {
            debug!(provider, "Invalidated cached access token");
        }
    }

    pub async fn cached(&self, provider: &str) -> Option<AccessToken> {
        self.cache.get(&provider.to_string()).await
    }

    async fn fetch_token(&self, transport: &HttpTransport) -> Result<AccessToken, ProviderError> {
        let provider = transport.provider();
        let request = TransportRequest::post(TOKEN_PATH)
            .with_query("client_id", self.credentials.client_id.as_str())
            .with_query("client_secret", self.credentials.client_secret.as_str());

        let response = transport
            .execute(&request)
            .await
            .map_err(|err| ProviderError::transport(provider, "token", err))?;

        if !response.is_success() {
            return Err(ProviderError::Status {
                provider: provider.to_string(),
                operation: "token",
                status: response.status,
                body: response.preview(),
            });
        }

        let body: TokenResponse = response
            .decode()
            .map_err(|err| ProviderError::decode(provider, "token", err))?;

        if body.access_token.trim().is_empty() {
            return Err(ProviderError::EmptyToken {
                provider: provider.to_string(),
            });
        }

        let expires_in = body.expires_in.unwrap_or(0);
        debug!(
            provider,
            expires_in,
            token_type = body.token_type.as_deref().unwrap_or("bearer"),
            "Obtained access token"
        );

        Ok(AccessToken::new(body.access_token, expiry_after(Utc::now(), expires_in)))
    }
}

fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    let lifetime = Duration::seconds(expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS));
    now.checked_add_signed(lifetime).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_boundary() {
        let now = Utc::now();

        let expiring = AccessToken::new("t", now + Duration::seconds(30));
        assert!(!expiring.is_fresh_at(now));

        let valid = AccessToken::new("t", now + Duration::seconds(120));
        assert!(valid.is_fresh_at(now));
    }

    #[test]
    fn test_exact_margin_is_stale() {
        let now = Utc::now();
        let token = AccessToken::new("t", now + Duration::seconds(REFRESH_MARGIN_SECS));
        assert!(!token.is_fresh_at(now));
    }

    #[test]
    fn test_expiry_is_capped() {
        let now = Utc::now();

        assert_eq!(
            expiry_after(now, 9_000_000_000_000),
            now + Duration::seconds(MAX_TOKEN_LIFETIME_SECS)
        );
        assert_eq!(expiry_after(now, i64::MAX), now + Duration::seconds(MAX_TOKEN_LIFETIME_SECS));
        assert_eq!(expiry_after(now, -5), now);
        assert_eq!(expiry_after(now, 3600), now + Duration::seconds(3600));
    }

    #[test]
    fn test_token_response_aliases() {
        let snake: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","token_type":"bearer","expires_in":3600}"#)
                .unwrap();
        assert_eq!(snake.access_token, "a");
        assert_eq!(snake.expires_in, Some(3600));

        let camel: TokenResponse =
            serde_json::from_str(r#"{"accessToken":"b","expiresIn":60}"#).unwrap();
        assert_eq!(camel.access_token, "b");
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let credentials = ClientCredentials::new("team-1", "s3cret");
        let printed = format!("{:?}", credentials);
        assert!(printed.contains("team-1"));
        assert!(!printed.contains("s3cret"));
    }
}
