//! Source health checks
//!
//! Probes every registered primary adapter concurrently, each bounded by its
//! own timeout. Used by `wygrzeb sources --check` and `GET /api/sources?check=true`.

use futures::future::join_all;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::Aggregator;
use crate::schemas::{SourceCategory, SourceId};
use crate::sources::RegisteredSource;

/// Health report of one source
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub id: SourceId,
    pub name: String,
    pub category: SourceCategory,
    pub configured: bool,
    pub has_fallback: bool,
    /// `None` when no probe was run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl SourceHealth {
    fn unchecked(source: &RegisteredSource) -> Self {
        Self {
            id: source.id().clone(),
            name: source.primary.name().to_string(),
            category: source.category(),
            configured: source.primary.is_configured(),
            has_fallback: source.fallback.is_some(),
            healthy: None,
            error: None,
            latency_ms: None,
        }
    }
}

impl Aggregator {
    /// Lists registered sources without contacting them
    pub fn list_sources(&self) -> Vec<SourceHealth> {
        self.registry().iter().map(SourceHealth::unchecked).collect()
    }

    /// Probes every source concurrently
    pub async fn health_check(&self, timeout: Duration) -> Vec<SourceHealth> {
        join_all(self.registry().iter().map(|source| self.probe(source, timeout))).await
    }

    async fn probe(&self, source: &RegisteredSource, timeout: Duration) -> SourceHealth {
        let mut report = SourceHealth::unchecked(source);

        // probes share the search call limit; the timeout starts once admitted
        let _permit = match self.retry.permit().await {
            Ok(permit) => permit,
            Err(e) => {
                report.healthy = Some(false);
                report.error = Some(e.to_string());
                return report;
            }
        };

        let start = Instant::now();
        let result = tokio::time::timeout(timeout, source.primary.health_check()).await;
        report.latency_ms = Some(start.elapsed().as_millis() as u64);

        match result {
            Ok(Ok(healthy)) => {
                debug!(source = %report.id, healthy = healthy, "Health check finished");
                report.healthy = Some(healthy);
            }
            Ok(Err(e)) => {
                warn!(source = %report.id, error = %e, "Health check failed");
                report.healthy = Some(false);
                report.error = Some(e.to_string());
            }
            Err(_) => {
                warn!(source = %report.id, timeout_ms = timeout.as_millis() as u64, "Health check timed out");
                report.healthy = Some(false);
                report.error = Some(format!("timed out after {:?}", timeout));
            }
        }

        report
    }
}
