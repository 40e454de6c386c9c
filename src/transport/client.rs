//! Resilient HTTP transport
//!
//! One `HttpTransport` per provider. Every call goes through `execute`,
//! which applies uniform headers, bounded linear-backoff retries on network
//! failures and 5xx responses, and content-type validation.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::TransportError;

const JSON: &str = "application/json";
const PREVIEW_LEN: usize = 200;

// =========================================================================
// Retry policy
// =========================================================================

/// Bounded retry with linear backoff: attempt `n` waits `n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

// =========================================================================
// Request / response
// =========================================================================

/// A provider call, independent of any particular attempt.
///
/// The body is serialized once up front and replayed on every attempt.
/// The route is a list of path segments; each one is percent-encoded on its
/// own when the URL is built, so identifiers cannot add segments or a query.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    method: Method,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl TransportRequest {
    /// `route` is a literal path such as `/accounts`; dynamic parts go
    /// through [`TransportRequest::with_segment`].
    pub fn new(method: Method, route: &str) -> Self {
        Self {
            method,
            segments: route
                .split('/')
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(route: &str) -> Self {
        Self::new(Method::GET, route)
    }

    pub fn post(route: &str) -> Self {
        Self::new(Method::POST, route)
    }

    pub fn delete(route: &str) -> Self {
        Self::new(Method::DELETE, route)
    }

    /// Append one path segment, taken verbatim.
    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, TransportError> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Unencoded path, for logging
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

/// Raw outcome of a call that was not retried away.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON. An empty body decodes as `null`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        if self.body.is_empty() {
            serde_json::from_slice(b"null")
        } else {
            serde_json::from_slice(&self.body)
        }
    }

    /// Truncated body text for error messages
    pub fn preview(&self) -> String {
        preview(&self.body)
    }
}

// The token call carries the client secret in its query string
fn network_error(source: reqwest::Error) -> TransportError {
    TransportError::Network {
        attempts: 1,
        source: source.without_url(),
    }
}

fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(PREVIEW_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}

// =========================================================================
// Transport
// =========================================================================

/// HTTP transport bound to one provider base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    provider: String,
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        client: reqwest::Client,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider: provider.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            retry,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Execute a request with retries.
    ///
    /// 4xx responses come back as `Ok` for the caller to interpret; only
    /// network failures and 5xx are retried.
    pub async fn execute(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.send_once(request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        provider = %self.provider,
                        method = %request.method,
                        path = %request.path(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.with_attempts(attempt)),
            }
        }
    }

    async fn send_once(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let url = self.url_for(request)?;
        debug!(
            provider = %self.provider,
            method = %request.method,
            path = %url.path(),
            "Calling provider"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header(ACCEPT, JSON);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.header(CONTENT_TYPE, JSON).body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(network_error)?
            .to_vec();

        if status >= 500 {
            return Err(TransportError::ServerStatus {
                status,
                attempts: 1,
                body: preview(&body),
            });
        }

        // Empty bodies (204, bare 201) carry no payload to validate
        if !body.is_empty() && !content_type.to_ascii_lowercase().contains(JSON) {
            return Err(TransportError::ContentType {
                status,
                content_type,
                preview: preview(&body),
            });
        }

        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }

    fn url_for(&self, request: &TransportRequest) -> Result<reqwest::Url, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidUrl {
            url: self.base_url.clone(),
            reason: reason.to_string(),
        };

        if let Some(segment) = request
            .segments
            .iter()
            .find(|segment| matches!(segment.as_str(), "" | "." | ".."))
        {
            return Err(invalid(&format!("invalid path segment {:?}", segment)));
        }

        let mut url =
            reqwest::Url::parse(&self.base_url).map_err(|err| invalid(&err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(request.segments.iter().map(String::as_str));
        Ok(url)
    }
}
