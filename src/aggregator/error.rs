//! Aggregator errors

use thiserror::Error;

use crate::domain::Interrupted;
use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{operation}: all {} provider(s) failed", .failures.len())]
    AllProvidersFailed {
        operation: &'static str,
        failures: Vec<ProviderError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl From<Interrupted> for AggregatorError {
    fn from(interrupted: Interrupted) -> Self {
        match interrupted {
            Interrupted::Cancelled => AggregatorError::Cancelled,
            Interrupted::DeadlineExceeded => AggregatorError::DeadlineExceeded,
        }
    }
}

impl AggregatorError {
    /// Underlying provider error of a targeted call
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            AggregatorError::Provider(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.provider_error().map_or(false, ProviderError::is_not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interrupted() {
        assert!(matches!(
            AggregatorError::from(Interrupted::Cancelled),
            AggregatorError::Cancelled
        ));
        assert!(matches!(
            AggregatorError::from(Interrupted::DeadlineExceeded),
            AggregatorError::DeadlineExceeded
        ));
    }

    #[test]
    fn test_all_failed_message() {
        let err = AggregatorError::AllProvidersFailed {
            operation: "accounts",
            failures: vec![ProviderError::EmptyToken {
                provider: "vbank".to_string(),
            }],
        };
        assert_eq!(err.to_string(), "accounts: all 1 provider(s) failed");
    }

    #[test]
    fn test_not_found_passthrough() {
        let err = AggregatorError::Provider(ProviderError::Status {
            provider: "vbank".to_string(),
            operation: "agreement",
            status: 404,
            body: String::new(),
        });
        assert!(err.is_not_found());
        assert!(!AggregatorError::UnknownProvider("x".to_string()).is_not_found());
    }
}
