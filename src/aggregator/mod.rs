//! Search Aggregation
//!
//! Implements: resolve sources → fan out → retry/fallback → merge → paginate
//!
//! Features:
//! - Every effective source runs concurrently; a settle-all barrier waits for all
//! - Per-source failures never fail the search, they land in `failedSources`
//! - Dropping the search future cancels every in-flight call and backoff sleep
//! - Prometheus metrics per search and per source

pub mod failures;
pub mod health;
pub mod merge;
pub mod paginate;

use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::metrics;
use crate::retry::{RetryPolicy, RetryWrapper};
use crate::schemas::{AggregatedResponse, RawSearchRequest, SearchRequest, MAX_PAGE_SIZE};
use crate::sources::SourceRegistry;

use failures::FailureReporter;
use merge::merge;
use paginate::paginate;

pub use health::SourceHealth;

/// Fan-out coordinator over an immutable source registry
#[derive(Clone)]
pub struct Aggregator {
    registry: Arc<SourceRegistry>,
    retry: RetryWrapper,
}

impl Aggregator {
    pub fn new(registry: Arc<SourceRegistry>, policy: RetryPolicy) -> Self {
        Self {
            registry,
            retry: RetryWrapper::new(policy),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Validates an unchecked request, then searches
    pub async fn search_raw(&self, raw: RawSearchRequest) -> Result<AggregatedResponse> {
        let request = raw.validate().map_err(|e| {
            metrics::record_search(metrics::SEARCH_INVALID, 0.0);
            e
        })?;
        Ok(self.search(&request).await)
    }

    /// Runs one aggregated search
    ///
    /// Never fails: sources that end exhausted are listed in `failed_sources`.
    #[instrument(
        skip(self, request),
        fields(
            correlation_id = %Uuid::new_v4(),
            query = %request.query,
            page = request.page,
            page_size = request.page_size
        )
    )]
    pub async fn search(&self, request: &SearchRequest) -> AggregatedResponse {
        let start = Instant::now();

        if request.is_blank() {
            debug!("Blank query, skipping fan-out");
            metrics::record_search(metrics::SEARCH_BLANK, start.elapsed().as_secs_f64());
            return AggregatedResponse::empty(request.page, request.page_size);
        }

        let effective = self.registry.resolve(request);
        let mut reporter = FailureReporter::new();

        for id in &effective.unknown {
            warn!(source = %id, "Unknown source requested");
        }

        let source_request = source_window(request);
        let requested = effective.sources.len();

        info!(
            sources = requested,
            unknown = effective.unknown.len(),
            "Fanning out search"
        );

        let outcomes = join_all(
            effective
                .sources
                .iter()
                .map(|source| self.retry.run(source, &source_request)),
        )
        .await;

        for outcome in &outcomes {
            reporter.record_outcome(outcome);
        }
        for id in &effective.unknown {
            reporter.record(id);
        }

        let merged = merge(outcomes, request.sort_by, request.sort_order);
        let merged_count = merged.items.len();
        let page = paginate(merged.items, request.page, request.page_size, merged.total_results);

        let failed = reporter.len();
        let status = if failed == 0 {
            metrics::SEARCH_OK
        } else if failed >= requested + effective.unknown.len() {
            warn!(failed_sources = failed, "All sources failed, returning empty result set");
            metrics::SEARCH_ALL_FAILED
        } else {
            metrics::SEARCH_PARTIAL
        };

        let elapsed = start.elapsed();
        metrics::record_search(status, elapsed.as_secs_f64());

        info!(
            merged = merged_count,
            returned = page.items.len(),
            total_results = merged.total_results,
            failed_sources = failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Search completed"
        );

        AggregatedResponse {
            results: page.items,
            total_results: merged.total_results,
            page: request.page,
            page_size: request.page_size,
            has_more: page.has_more,
            failed_sources: reporter.into_failed_sources(),
        }
    }
}

/// Request sent to each source: the first `page * page_size` items
///
/// The merged list is paginated afterwards, so every source has to supply the
/// window up to the requested page. Windows are capped at `MAX_PAGE_SIZE`.
fn source_window(request: &SearchRequest) -> SearchRequest {
    let window = request
        .page
        .saturating_mul(request.page_size)
        .clamp(1, MAX_PAGE_SIZE);
    request.clone().with_page(1, window)
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("sources", &self.registry.ids())
            .field("policy", self.retry.policy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::schemas::{NewsDetails, ResultDetails, SearchResult, SourceCategory, SourceId, SourceInfo};
    use crate::sources::{SourceAdapter, SourceMetadata, SourcePage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FixedAdapter {
        metadata: SourceMetadata,
        result: std::result::Result<usize, AdapterError>,
        calls: AtomicU32,
        last_page_size: AtomicU32,
    }

    impl FixedAdapter {
        fn new(id: &str, result: std::result::Result<usize, AdapterError>) -> Arc<Self> {
            Arc::new(Self {
                metadata: SourceMetadata {
                    id: SourceId::from(id),
                    name: id.to_string(),
                    description: String::new(),
                    category: SourceCategory::News,
                    homepage: String::new(),
                    supports_pagination: true,
                },
                result,
                calls: AtomicU32::new(0),
                last_page_size: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for FixedAdapter {
        fn metadata(&self) -> &SourceMetadata {
            &self.metadata
        }

        async fn fetch(&self, request: &SearchRequest) -> std::result::Result<SourcePage, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_page_size.store(request.page_size, Ordering::SeqCst);
            let count = self.result.clone()?;
            let items = (0..count)
                .map(|i| {
                    SearchResult::new(
                        format!("{}-{}-{}", self.metadata.id, i, i),
                        format!("Item {}", i),
                        format!("https://example.com/{}/{}", self.metadata.id, i),
                        SourceInfo::new("Example", "https://example.com"),
                        ResultDetails::News(NewsDetails::default()),
                    )
                })
                .collect();
            Ok(SourcePage::new(items, Some(count as u64)))
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn aggregator(adapters: &[Arc<FixedAdapter>]) -> Aggregator {
        let registry = adapters
            .iter()
            .fold(SourceRegistry::builder(), |b, a| b.register(a.clone()))
            .build();
        Aggregator::new(Arc::new(registry), fast_policy())
    }

    #[tokio::test]
    async fn test_blank_query_makes_no_calls() {
        let newsapi = FixedAdapter::new("newsapi", Ok(3));
        let aggregator = aggregator(&[newsapi.clone()]);

        for query in ["", "   "] {
            let response = aggregator.search(&SearchRequest::new(query)).await;
            assert!(response.results.is_empty());
            assert_eq!(response.total_results, 0);
            assert!(!response.has_more);
            assert!(response.failed_sources.is_empty());
        }
        assert_eq!(newsapi.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_source_isolated() {
        let newsapi = FixedAdapter::new("newsapi", Ok(5));
        let google = FixedAdapter::new("google-news", Ok(3));
        let twitter = FixedAdapter::new(
            "twitter",
            Err(AdapterError::UpstreamUnavailable("timeout".into())),
        );
        let aggregator = aggregator(&[newsapi, google, twitter.clone()]);

        let response = aggregator.search(&SearchRequest::new("wybory")).await;

        assert_eq!(response.results.len(), 8);
        assert_eq!(response.total_results, 8);
        assert!(!response.has_more);
        assert_eq!(response.failed_sources, vec![SourceId::from("twitter")]);
        assert_eq!(twitter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_all_sources_failing_is_still_a_response() {
        let newsapi = FixedAdapter::new("newsapi", Err(AdapterError::AuthError("401".into())));
        let aggregator = aggregator(&[newsapi]);

        let request = SearchRequest::new("wybory").with_sources(vec![
            SourceId::from("newsapi"),
            SourceId::from("bing"),
        ]);
        let response = aggregator.search(&request).await;

        assert!(response.results.is_empty());
        assert_eq!(
            response.failed_sources,
            vec![SourceId::from("newsapi"), SourceId::from("bing")]
        );
    }

    #[tokio::test]
    async fn test_sources_receive_page_window() {
        let newsapi = FixedAdapter::new("newsapi", Ok(8));
        let aggregator = aggregator(&[newsapi.clone()]);

        let response = aggregator
            .search(&SearchRequest::new("wybory").with_page(2, 5))
            .await;

        assert_eq!(newsapi.last_page_size.load(Ordering::SeqCst), 10);
        let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["newsapi-5-5", "newsapi-6-6", "newsapi-7-7"]);
        assert!(!response.has_more);
        assert_eq!(response.page, 2);
        assert_eq!(response.page_size, 5);
    }

    #[test]
    fn test_source_window_is_capped() {
        let request = SearchRequest::new("q").with_page(30, 50);
        let window = source_window(&request);
        assert_eq!(window.page, 1);
        assert_eq!(window.page_size, MAX_PAGE_SIZE);
    }
}
