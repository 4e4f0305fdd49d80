//! Error types for the search aggregator
//!
//! Two layers:
//! - `AdapterError`: per-source failures, absorbed by the retry wrapper
//! - `AggregatorError`: top-level failures that reach the caller

use thiserror::Error;

/// Failure of a single source adapter call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream error: {status} - {message}")]
    UpstreamError {
        status: u16,
        message: String,
    },

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Circuit breaker open for source: {0}")]
    CircuitOpen(String),
}

impl AdapterError {
    /// Whether the retry wrapper should try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::UpstreamUnavailable(_) | AdapterError::RateLimited(_)
        )
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::UpstreamUnavailable(_) => "upstream_unavailable",
            AdapterError::UpstreamError { .. } => "upstream_error",
            AdapterError::AuthError(_) => "auth_error",
            AdapterError::RateLimited(_) => "rate_limited",
            AdapterError::InvalidRequest(_) => "invalid_request",
            AdapterError::CircuitOpen(_) => "circuit_open",
        }
    }

    /// Payload that could not be decoded into the provider's schema
    pub fn decode(source: &str, err: impl std::fmt::Display) -> Self {
        AdapterError::UpstreamError {
            status: 200,
            message: format!("{} returned an undecodable payload: {}", source, err),
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return AdapterError::UpstreamUnavailable(err.to_string());
        }
        if err.is_decode() {
            return AdapterError::UpstreamError {
                status: 200,
                message: err.to_string(),
            };
        }
        match err.status() {
            Some(status) => AdapterError::UpstreamError {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => AdapterError::UpstreamUnavailable(err.to_string()),
        }
    }
}

/// Failure that aborts a whole search or the service itself
#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
