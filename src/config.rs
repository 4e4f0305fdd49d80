//! Configuration for the Search Aggregator
//!
//! Values come from environment variables (after `.env` is loaded), optionally
//! layered over a TOML file. Every tunable has a serde default so an empty
//! environment yields a working, credential-less configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{AggregatorError, Result};
use crate::http_client::HttpClientConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // HTTP surface
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    // Provider base URLs
    #[serde(default = "default_newsapi_base_url")]
    pub newsapi_base_url: String,
    #[serde(default = "default_newsapi_base_url")]
    pub google_news_base_url: String,
    #[serde(default = "default_serpapi_base_url")]
    pub serpapi_base_url: String,
    #[serde(default = "default_fact_check_base_url")]
    pub fact_check_base_url: String,
    #[serde(default = "default_twitter_base_url")]
    pub twitter_base_url: String,
    #[serde(default = "default_dane_gov_base_url")]
    pub dane_gov_base_url: String,
    #[serde(default = "default_stat_gov_base_url")]
    pub stat_gov_base_url: String,
    #[serde(default = "default_sdg_base_url")]
    pub sdg_base_url: String,

    // Credentials
    pub news_api_key: Option<String>,
    pub google_news_api_key: Option<String>,
    pub serp_api_key: Option<String>,
    pub google_fact_check_api_key: Option<String>,
    pub twitter_bearer_token: Option<String>,
    pub dane_gov_api_key: Option<String>,
    pub stat_gov_api_key: Option<String>,
    pub sdg_api_token: Option<String>,

    // Retry policy
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
    #[serde(default)]
    pub retry_jitter: f64,

    // Timeouts
    #[serde(default = "default_source_timeout")]
    pub source_timeout_ms: u64,
    #[serde(default = "default_source_deadline")]
    pub source_deadline_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_ms: u64,

    // Concurrency
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    // Circuit breaker
    #[serde(default)]
    pub circuit_breaker_enabled: bool,
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_open_duration_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_newsapi_base_url() -> String {
    "https://newsapi.org".to_string()
}

fn default_serpapi_base_url() -> String {
    "https://serpapi.com".to_string()
}

fn default_fact_check_base_url() -> String {
    "https://factchecktools.googleapis.com".to_string()
}

fn default_twitter_base_url() -> String {
    "https://api.twitter.com".to_string()
}

fn default_dane_gov_base_url() -> String {
    "https://api.dane.gov.pl".to_string()
}

fn default_stat_gov_base_url() -> String {
    "https://api-dbw.stat.gov.pl".to_string()
}

fn default_sdg_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay() -> u64 {
    300
}

fn default_retry_max_delay() -> u64 {
    5000
}

fn default_source_timeout() -> u64 {
    8000
}

fn default_source_deadline() -> u64 {
    20000
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_health_check_timeout() -> u64 {
    3000
}

fn default_max_concurrent_requests() -> usize {
    16
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}

fn default_circuit_breaker_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            metrics_enabled: default_metrics_enabled(),
            newsapi_base_url: default_newsapi_base_url(),
            google_news_base_url: default_newsapi_base_url(),
            serpapi_base_url: default_serpapi_base_url(),
            fact_check_base_url: default_fact_check_base_url(),
            twitter_base_url: default_twitter_base_url(),
            dane_gov_base_url: default_dane_gov_base_url(),
            stat_gov_base_url: default_stat_gov_base_url(),
            sdg_base_url: default_sdg_base_url(),
            news_api_key: None,
            google_news_api_key: None,
            serp_api_key: None,
            google_fact_check_api_key: None,
            twitter_bearer_token: None,
            dane_gov_api_key: None,
            stat_gov_api_key: None,
            sdg_api_token: None,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            retry_jitter: 0.0,
            source_timeout_ms: default_source_timeout(),
            source_deadline_ms: default_source_deadline(),
            connect_timeout_ms: default_connect_timeout(),
            health_check_timeout_ms: default_health_check_timeout(),
            max_concurrent_requests: default_max_concurrent_requests(),
            circuit_breaker_enabled: false,
            circuit_breaker_failure_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_open_duration_secs: default_circuit_breaker_timeout(),
        }
    }
}

impl Config {
    /// Loads configuration from `.env`, the environment and an optional TOML file
    ///
    /// Environment variables win over the file.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.source_timeout_ms == 0 {
            return Err(config_error("source_timeout_ms must be greater than zero"));
        }
        if self.source_deadline_ms == 0 {
            return Err(config_error("source_deadline_ms must be greater than zero"));
        }
        if self.source_deadline_ms < self.source_timeout_ms {
            return Err(config_error(
                "source_deadline_ms must not be lower than source_timeout_ms",
            ));
        }
        if self.health_check_timeout_ms == 0 {
            return Err(config_error("health_check_timeout_ms must be greater than zero"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(config_error("max_concurrent_requests must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(config_error("retry_jitter must be within 0.0..=1.0"));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(config_error(
                "retry_max_delay_ms must not be lower than retry_base_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn source_deadline(&self) -> Duration {
        Duration::from_millis(self.source_deadline_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter: self.retry_jitter,
            call_timeout: self.source_timeout(),
            deadline: self.source_deadline(),
            max_concurrent_calls: self.max_concurrent_requests,
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout: self.source_timeout(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            ..Default::default()
        }
    }

    /// Breaker settings, or `None` when the breaker is disabled
    pub fn circuit_breaker_config(&self) -> Option<CircuitBreakerConfig> {
        if !self.circuit_breaker_enabled {
            return None;
        }
        Some(CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_failure_threshold,
            open_duration: Duration::from_secs(self.circuit_breaker_open_duration_secs),
            ..Default::default()
        })
    }
}

fn config_error(message: &str) -> AggregatorError {
    AggregatorError::ConfigError(config::ConfigError::Message(message.to_string()))
}
