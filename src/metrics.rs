//! Prometheus Metrics for the Search Aggregator
//!
//! Metrics include:
//! - upstream calls per source and outcome
//! - retries and fallback invocations
//! - latency per source (histogram) and per search
//! - searches served and sources reported as failed

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramOpts, HistogramVec, IntCounterVec, TextEncoder,
};
use tracing::error;

use crate::error::AdapterError;

// ============================================
// METRIC DEFINITIONS
// ============================================

/// Outcome label for a successful call
pub const OUTCOME_SUCCESS: &str = "success";

/// Search status labels
pub const SEARCH_OK: &str = "ok";
pub const SEARCH_PARTIAL: &str = "partial";
pub const SEARCH_ALL_FAILED: &str = "all_failed";
pub const SEARCH_BLANK: &str = "blank";
pub const SEARCH_INVALID: &str = "invalid";

// Upstream calls, one per attempt
static SOURCE_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wygrzeb_source_calls_total",
        "Total number of upstream calls by source, route and outcome",
        &["source", "route", "outcome"]
    )
    .expect("Failed to create source_calls metric")
});

static SOURCE_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wygrzeb_source_retries_total",
        "Number of retries scheduled after a retryable error",
        &["source"]
    )
    .expect("Failed to create source_retries metric")
});

static SOURCE_FALLBACKS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wygrzeb_source_fallbacks_total",
        "Number of fallback invocations by result",
        &["source", "status"]
    )
    .expect("Failed to create source_fallbacks metric")
});

// Latency of one source including retries and fallback (in seconds)
static SOURCE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 30.0];
    register_histogram_vec!(
        HistogramOpts::new(
            "wygrzeb_source_latency_seconds",
            "Time spent resolving one source, retries and fallback included"
        )
        .buckets(buckets),
        &["source"]
    )
    .expect("Failed to create source_latency metric")
});

static SEARCH_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    let buckets = vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0];
    register_histogram!(HistogramOpts::new(
        "wygrzeb_search_latency_seconds",
        "End-to-end latency of one aggregated search"
    )
    .buckets(buckets))
    .expect("Failed to create search_latency metric")
});

static SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wygrzeb_searches_total",
        "Total number of searches by status",
        &["status"]
    )
    .expect("Failed to create searches metric")
});

static FAILED_SOURCES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "wygrzeb_failed_sources_total",
        "Number of times a source was reported in failedSources",
        &["source"]
    )
    .expect("Failed to create failed_sources metric")
});

// ============================================
// METRICS API
// ============================================

/// Records the outcome of one upstream call
pub fn record_source_call(source: &str, route: &str, result: Result<(), &AdapterError>) {
    let outcome = match result {
        Ok(()) => OUTCOME_SUCCESS,
        Err(e) => e.kind(),
    };
    SOURCE_CALLS.with_label_values(&[source, route, outcome]).inc();
}

pub fn record_retry(source: &str) {
    SOURCE_RETRIES.with_label_values(&[source]).inc();
}

pub fn record_fallback(source: &str, succeeded: bool) {
    let status = if succeeded { "success" } else { "failure" };
    SOURCE_FALLBACKS.with_label_values(&[source, status]).inc();
}

pub fn record_source_latency(source: &str, latency_secs: f64) {
    SOURCE_LATENCY.with_label_values(&[source]).observe(latency_secs);
}

pub fn record_search(status: &str, latency_secs: f64) {
    SEARCHES.with_label_values(&[status]).inc();
    SEARCH_LATENCY.observe(latency_secs);
}

pub fn record_failed_source(source: &str) {
    FAILED_SOURCES.with_label_values(&[source]).inc();
}

// ============================================
// METRICS COLLECTION
// ============================================

/// Collects all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

/// Times one source and records its latency on drop
pub struct SourceTimer {
    source: String,
    start: std::time::Instant,
}

impl SourceTimer {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for SourceTimer {
    fn drop(&mut self) {
        record_source_latency(&self.source, self.start.elapsed().as_secs_f64());
    }
}
