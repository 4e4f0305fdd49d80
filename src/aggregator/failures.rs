//! Failure Reporter

use tracing::debug;

use crate::metrics;
use crate::retry::SourceOutcome;
use crate::schemas::SourceId;

/// Ordered, duplicate-free list of sources that produced nothing
#[derive(Debug, Default)]
pub struct FailureReporter {
    failed: Vec<SourceId>,
}

impl FailureReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source: &SourceId) {
        if self.failed.contains(source) {
            return;
        }
        metrics::record_failed_source(source.as_str());
        self.failed.push(source.clone());
    }

    pub fn record_outcome(&mut self, outcome: &SourceOutcome) {
        if let Some(error) = outcome.error() {
            debug!(source = %outcome.source, error_kind = error.kind(), "Reporting failed source");
            self.record(&outcome.source);
        }
    }

    pub fn len(&self) -> usize {
        self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn into_failed_sources(self) -> Vec<SourceId> {
        self.failed
    }
}
