//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::transport::RetryPolicy;

const DEFAULT_BANKS: &str = "vbank,abank,sbank";

/// One configured provider endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Short provider code, also used as the `bank` tag on results
    pub code: String,

    /// Base URL without trailing slash
    pub base_url: String,
}

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Client id at every provider, also sent as the requesting party
    pub team_id: String,

    /// Client secret for the token endpoints
    pub client_secret: String,

    /// Providers in fan-out order
    pub providers: Vec<ProviderConfig>,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Allowed browser origin
    pub cors_origin: String,

    /// Environment (development, production)
    pub environment: String,

    /// Per-attempt timeout of provider HTTP calls
    pub http_timeout: Duration,

    /// Deadline attached to every API request
    pub request_timeout: Duration,

    /// Transport retry policy
    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let team_id = env::var("TEAM_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnv("TEAM_ID"))?;

        let client_secret = env::var("CLIENT_SECRET")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnv("CLIENT_SECRET"))?;

        let banks = env::var("BANKS").unwrap_or_else(|_| DEFAULT_BANKS.to_string());
        let providers = parse_providers(&banks, |name| env::var(name).ok())?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let cors_origin =
            env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let http_timeout = Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 30)?);
        let request_timeout = Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", 60)?);

        let max_attempts: u32 = parse_env("RETRY_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue("RETRY_MAX_ATTEMPTS"));
        }
        let base_delay = Duration::from_millis(parse_env("RETRY_BASE_DELAY_MS", 1000)?);

        Ok(Self {
            team_id,
            client_secret,
            providers,
            host,
            port,
            cors_origin,
            environment,
            http_timeout,
            request_timeout,
            retry: RetryPolicy::new(max_attempts, base_delay),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn provider_codes(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.code.as_str()).collect()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("team_id", &self.team_id)
            .field("client_secret", &"***")
            .field("providers", &self.providers)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("cors_origin", &self.cors_origin)
            .field("environment", &self.environment)
            .field("http_timeout", &self.http_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Resolve provider codes to base URLs via `lookup("BASE_URL_<CODE>")`.
///
/// Codes without a URL are skipped with a warning; a URL that is not
/// http(s) is an error, as is ending up with no providers at all.
pub fn parse_providers<F>(codes: &str, lookup: F) -> Result<Vec<ProviderConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut providers: Vec<ProviderConfig> = Vec::new();

    for code in codes.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let code = code.to_ascii_lowercase();
        if providers.iter().any(|p| p.code == code) {
            continue;
        }

        let var = format!("BASE_URL_{}", code.to_ascii_uppercase());
        let url = match lookup(&var).map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            Some(url) => url,
            None => {
                warn!(provider = %code, variable = %var, "No base URL configured, skipping provider");
                continue;
            }
        };

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidProviderUrl { code, url });
        }

        providers.push(ProviderConfig {
            base_url: url.trim_end_matches('/').to_string(),
            code,
        });
    }

    if providers.is_empty() {
        return Err(ConfigError::NoProviders);
    }
    Ok(providers)
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),

    #[error("Invalid base URL for provider {code}: {url} (must start with http:// or https://)")]
    InvalidProviderUrl { code: String, url: String },

    #[error("No providers configured (set BANKS and BASE_URL_<CODE>)")]
    NoProviders,
}
