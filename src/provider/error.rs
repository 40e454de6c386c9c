//! Provider errors
//!
//! Every variant names the provider and, where a call was involved, the
//! operation, so a targeted failure can be diagnosed from the message alone.

use thiserror::Error;

use crate::domain::ConsentKind;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: {operation} failed: {source}")]
    Transport {
        provider: String,
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{provider}: {operation} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider}: token endpoint returned an empty access token")]
    EmptyToken { provider: String },

    #[error("{provider}: {kind} consent request returned an empty consent id")]
    EmptyConsentId { provider: String, kind: ConsentKind },

    #[error("{provider}: could not decode {operation} response: {source}")]
    Decode {
        provider: String,
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ProviderError {
    pub fn transport(provider: &str, operation: &'static str, source: TransportError) -> Self {
        Self::Transport {
            provider: provider.to_string(),
            operation,
            source,
        }
    }

    pub fn decode(provider: &str, operation: &'static str, source: serde_json::Error) -> Self {
        Self::Decode {
            provider: provider.to_string(),
            operation,
            source,
        }
    }

    /// Provider code the error came from
    pub fn provider(&self) -> &str {
        match self {
            Self::Transport { provider, .. }
            | Self::Status { provider, .. }
            | Self::EmptyToken { provider }
            | Self::EmptyConsentId { provider, .. }
            | Self::Decode { provider, .. } => provider,
        }
    }

    /// HTTP status returned by the provider, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Check if the provider rejected our credentials
    pub fn is_auth_error(&self) -> bool {
        match self {
            Self::EmptyToken { .. } => true,
            Self::Status { status, .. } => matches!(status, 401 | 403),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_helpers() {
        let err = ProviderError::Status {
            provider: "vbank".to_string(),
            operation: "accounts",
            status: 403,
            body: "forbidden".to_string(),
        };

        assert_eq!(err.provider(), "vbank");
        assert_eq!(err.status(), Some(403));
        assert!(err.is_auth_error());
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "vbank: accounts returned HTTP 403: forbidden"
        );
    }

    #[test]
    fn test_empty_token_is_auth_error() {
        let err = ProviderError::EmptyToken {
            provider: "abank".to_string(),
        };
        assert!(err.is_auth_error());
        assert_eq!(err.status(), None);
    }
}
