//! HTTP Client Module
//!
//! Transport shared by every source adapter:
//! - One pooled `reqwest::Client` for the whole process
//! - Per-request timeout, reported as `UpstreamUnavailable`
//! - Status classification into the `AdapterError` taxonomy
//! - Optional per-source circuit breaker
//!
//! Retrying and the concurrency limit live in the retry wrapper, which holds a
//! permit before the per-call timeout starts.

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{AdapterError, AggregatorError, Result};
use crate::schemas::SourceId;

/// Longest upstream error body kept in an `AdapterError`
const MAX_ERROR_BODY: usize = 512;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Bound on one request, connect through body
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(8),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("Wygrzeb-Search/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Pooled HTTP client shared by every source
pub struct ResilientHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl ResilientHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(AggregatorError::HttpError)?;

        Ok(Self { client, config })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(HttpClientConfig::default())
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Sends a request once
    pub async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, AdapterError> {
        match tokio::time::timeout(self.config.request_timeout, request.send()).await {
            Ok(result) => result.map_err(AdapterError::from),
            Err(_) => Err(AdapterError::UpstreamUnavailable(format!(
                "request timed out after {:?}",
                self.config.request_timeout
            ))),
        }
    }

}

/// Maps a non-success HTTP status onto the adapter error taxonomy
///
/// GitHub signals an exhausted quota with 403 and `x-ratelimit-remaining: 0`;
/// that case is a rate limit, not an auth failure.
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> AdapterError {
    let message = truncate(body);

    match status {
        StatusCode::TOO_MANY_REQUESTS => AdapterError::RateLimited(message),
        StatusCode::FORBIDDEN if quota_exhausted(headers) => AdapterError::RateLimited(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdapterError::AuthError(format!(
            "{}: {}",
            status.as_u16(),
            message
        )),
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => {
            AdapterError::UpstreamUnavailable(format!("{}: {}", status.as_u16(), message))
        }
        _ => AdapterError::UpstreamError {
            status: status.as_u16(),
            message,
        },
    }
}

fn quota_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Per-source view of the shared client
#[derive(Clone)]
pub struct SourceHttpClient {
    client: Arc<ResilientHttpClient>,
    source_id: SourceId,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl SourceHttpClient {
    pub fn new(client: Arc<ResilientHttpClient>, source_id: impl Into<SourceId>) -> Self {
        Self {
            client,
            source_id: source_id.into(),
            circuit_breaker: None,
        }
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.inner().get(url)
    }

    /// Sends a request and decodes a 2xx JSON body into `T`
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, AdapterError> {
        if let Some(breaker) = &self.circuit_breaker {
            if !breaker.allow_request() {
                warn!(source = %self.source_id, "Circuit breaker open, request blocked");
                return Err(AdapterError::CircuitOpen(self.source_id.to_string()));
            }
        }

        let result = self.execute_json(request).await;

        if let Some(breaker) = &self.circuit_breaker {
            match &result {
                Ok(_) => breaker.record_success(),
                Err(e) if counts_against_upstream(e) => breaker.record_failure(),
                Err(_) => {}
            }
        }

        result
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, AdapterError> {
        let response = self.client.send(request).await?;
        let status = response.status();

        debug!(source = %self.source_id, status = %status, "Upstream responded");

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &headers, &body));
        }

        let bytes = response.bytes().await.map_err(AdapterError::from)?;
        serde_json::from_slice(&bytes).map_err(|e| AdapterError::decode(self.source_id.as_str(), e))
    }
}

/// Auth and local input errors say nothing about upstream health
fn counts_against_upstream(err: &AdapterError) -> bool {
    match err {
        AdapterError::UpstreamUnavailable(_) | AdapterError::RateLimited(_) => true,
        AdapterError::UpstreamError { status, .. } => *status >= 500,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_config_defaults() {
        let config = HttpClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_client_builds_with_custom_timeouts() {
        let config = HttpClientConfig {
            request_timeout: Duration::from_millis(250),
            connect_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        assert!(ResilientHttpClient::new(config).is_ok());
    }

    #[test]
    fn test_classify_status() {
        let headers = HeaderMap::new();
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &headers, ""),
            AdapterError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, &headers, ""),
            AdapterError::UpstreamUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::REQUEST_TIMEOUT, &headers, ""),
            AdapterError::UpstreamUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, &headers, ""),
            AdapterError::AuthError(_)
        ));
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, &headers, "missing"),
            AdapterError::UpstreamError {
                status: 404,
                message: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_github_quota_exhaustion_is_rate_limit() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, &headers, "API rate limit exceeded"),
            AdapterError::RateLimited(_)
        ));

        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, &headers, "forbidden"),
            AdapterError::AuthError(_)
        ));
    }

    #[test]
    fn test_error_body_truncated() {
        let body = "x".repeat(2000);
        match classify_status(StatusCode::BAD_REQUEST, &HeaderMap::new(), &body) {
            AdapterError::UpstreamError { message, .. } => {
                assert_eq!(message.len(), MAX_ERROR_BODY + 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_breaker_accounting_ignores_auth() {
        assert!(counts_against_upstream(&AdapterError::UpstreamUnavailable("t".into())));
        assert!(counts_against_upstream(&AdapterError::UpstreamError {
            status: 500,
            message: String::new()
        }));
        assert!(!counts_against_upstream(&AdapterError::AuthError("401".into())));
        assert!(!counts_against_upstream(&AdapterError::UpstreamError {
            status: 404,
            message: String::new()
        }));
    }
}
