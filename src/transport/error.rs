//! Transport errors

use thiserror::Error;

/// Failure of one logical HTTP call, after retries.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error after {attempts} attempt(s): {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("server error {status} after {attempts} attempt(s): {body}")]
    ServerStatus {
        status: u16,
        attempts: u32,
        body: String,
    },

    #[error("unexpected content type {content_type:?} (status {status}): {preview}")]
    ContentType {
        status: u16,
        content_type: String,
        preview: String,
    },

    #[error("invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl TransportError {
    /// Check if this error is worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Network { .. } | TransportError::ServerStatus { .. }
        )
    }

    /// Number of attempts made before giving up, when known
    pub fn attempts(&self) -> Option<u32> {
        match self {
            TransportError::Network { attempts, .. }
            | TransportError::ServerStatus { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// HTTP status carried by the error, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::ServerStatus { status, .. }
            | TransportError::ContentType { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn with_attempts(self, count: u32) -> Self {
        match self {
            TransportError::Network { source, .. } => TransportError::Network {
                attempts: count,
                source,
            },
            TransportError::ServerStatus { status, body, .. } => TransportError::ServerStatus {
                status,
                attempts: count,
                body,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let server = TransportError::ServerStatus {
            status: 503,
            attempts: 1,
            body: String::new(),
        };
        assert!(server.is_retryable());

        let content = TransportError::ContentType {
            status: 200,
            content_type: "text/html".to_string(),
            preview: "<html>".to_string(),
        };
        assert!(!content.is_retryable());
        assert_eq!(content.status(), Some(200));
    }

    #[test]
    fn test_with_attempts_annotates() {
        let err = TransportError::ServerStatus {
            status: 502,
            attempts: 1,
            body: "bad gateway".to_string(),
        }
        .with_attempts(3);

        assert_eq!(err.attempts(), Some(3));
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }
}
