//! Search sources
//!
//! Each upstream provider implements the `SourceAdapter` trait: it turns the
//! canonical `SearchRequest` into a provider call and maps the reply into
//! canonical `SearchResult`s. Providers with a secondary route also expose a
//! fallback adapter, registered next to the primary in the `SourceRegistry`.

pub mod dane_gov;
pub mod fact_check;
pub mod google_news;
pub mod newsapi;
pub mod registry;
pub mod sdg;
pub mod stat_gov;
pub mod x_api;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AdapterError;
use crate::schemas::{SearchRequest, SearchResult, SourceCategory, SourceId};

/// Query used by the default health probe
pub const HEALTH_PROBE_QUERY: &str = "polska";

/// Static description of a source
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub id: SourceId,
    pub name: String,
    pub description: String,
    pub category: SourceCategory,
    pub homepage: String,
    /// Whether page/pageSize reach the provider
    pub supports_pagination: bool,
}

/// One provider page mapped into canonical results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePage {
    pub items: Vec<SearchResult>,
    /// Provider-reported total, or the item count when it reports none
    pub total_results: u64,
}

impl SourcePage {
    pub fn new(items: Vec<SearchResult>, total_results: Option<u64>) -> Self {
        let total_results = total_results.unwrap_or(items.len() as u64);
        Self {
            items,
            total_results,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Trait implemented by every primary and fallback adapter
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn metadata(&self) -> &SourceMetadata;

    /// Performs one provider call; never retries
    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError>;

    /// Whether the credentials this adapter needs are present
    fn is_configured(&self) -> bool {
        true
    }

    /// Cheap availability probe
    async fn health_check(&self) -> Result<bool, AdapterError> {
        let probe = SearchRequest::new(HEALTH_PROBE_QUERY).with_page(1, 1);
        self.fetch(&probe).await.map(|_| true)
    }

    fn id(&self) -> &SourceId {
        &self.metadata().id
    }

    fn name(&self) -> &str {
        &self.metadata().name
    }
}

// ============================================
// SHARED ADAPTER HELPERS
// ============================================

/// Rejects blank queries for keyword-only providers
pub(crate) fn require_query<'a>(
    request: &'a SearchRequest,
    source: &str,
) -> Result<&'a str, AdapterError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(AdapterError::InvalidRequest(format!(
            "{} requires a non-empty query",
            source
        )));
    }
    Ok(query)
}

/// Returns the configured credential or an `AuthError` naming the variable
pub(crate) fn require_credential<'a>(
    credential: &'a Option<String>,
    variable: &str,
) -> Result<&'a str, AdapterError> {
    credential
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AdapterError::AuthError(format!("{} is not configured", variable)))
}

/// Joins a base URL and an absolute path
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Trims and drops empty strings coming from providers
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub use dane_gov::{DaneGovAdapter, DaneGovFallbackAdapter};
pub use fact_check::FactCheckAdapter;
pub use google_news::{GoogleNewsAdapter, SerpApiNewsAdapter};
pub use newsapi::{NewsApiAdapter, NewsApiFallbackAdapter};
pub use registry::{RegisteredSource, SourceRegistry, SourceRegistryBuilder};
pub use sdg::{SdgAdapter, SdgFallbackAdapter};
pub use stat_gov::{StatGovAdapter, StatGovFallbackAdapter};
pub use x_api::{XApiAdapter, XApiFallbackAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_query() {
        let blank = SearchRequest::new("  ");
        assert!(matches!(
            require_query(&blank, "newsapi"),
            Err(AdapterError::InvalidRequest(_))
        ));
        let request = SearchRequest::new(" smog ");
        assert_eq!(require_query(&request, "newsapi").unwrap(), "smog");
    }

    #[test]
    fn test_require_credential() {
        assert!(matches!(
            require_credential(&None, "NEWS_API_KEY"),
            Err(AdapterError::AuthError(_))
        ));
        assert!(require_credential(&Some(" ".to_string()), "NEWS_API_KEY").is_err());
        assert_eq!(
            require_credential(&Some("abc".to_string()), "NEWS_API_KEY").unwrap(),
            "abc"
        );
    }

    #[test]
    fn test_source_page_total_defaults_to_len() {
        assert_eq!(SourcePage::new(Vec::new(), None).total_results, 0);
        assert_eq!(SourcePage::new(Vec::new(), Some(42)).total_results, 42);
    }

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            endpoint("https://newsapi.org/", "/v2/everything"),
            "https://newsapi.org/v2/everything"
        );
    }
}
