//! Error handling module
//!
//! API error type and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::aggregator::AggregatorError;
use crate::provider::ProviderError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn provider_status(err: &ProviderError) -> (StatusCode, &'static str, Option<String>) {
    let details = Some(err.provider().to_string());
    match err {
        ProviderError::Status { status: 404, .. } => (StatusCode::NOT_FOUND, "not_found", details),
        _ if err.is_auth_error() => (StatusCode::BAD_GATEWAY, "provider_auth_failed", details),
        ProviderError::Status { status, .. } if (400..500).contains(status) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "provider_rejected", details)
        }
        ProviderError::EmptyConsentId { .. } => {
            (StatusCode::BAD_GATEWAY, "consent_failed", details)
        }
        ProviderError::Decode { .. } => (StatusCode::BAD_GATEWAY, "provider_bad_response", details),
        ProviderError::Transport { .. }
        | ProviderError::Status { .. }
        | ProviderError::EmptyToken { .. } => {
            (StatusCode::BAD_GATEWAY, "provider_unavailable", details)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            AppError::Aggregator(err) => match err {
                AggregatorError::UnknownProvider(code) => {
                    (StatusCode::BAD_REQUEST, "unknown_provider", Some(code.clone()))
                }
                AggregatorError::Provider(provider_err) => {
                    tracing::warn!(error = %provider_err, "Provider call failed");
                    provider_status(provider_err)
                }
                AggregatorError::AllProvidersFailed { failures, .. } => {
                    tracing::error!(failures = failures.len(), "All providers failed");
                    let providers: Vec<&str> =
                        failures.iter().map(ProviderError::provider).collect();
                    (
                        StatusCode::BAD_GATEWAY,
                        "all_providers_failed",
                        Some(providers.join(",")),
                    )
                }
                AggregatorError::DeadlineExceeded => {
                    (StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded", None)
                }
                AggregatorError::Cancelled => {
                    (StatusCode::SERVICE_UNAVAILABLE, "cancelled", None)
                }
            },
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
