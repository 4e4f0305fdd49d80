//! Source Registry
//!
//! Immutable, priority-ordered set of registered sources. Built once at
//! start-up and shared with the aggregator; each entry pairs a primary adapter
//! with an optional fallback.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    DaneGovAdapter, DaneGovFallbackAdapter, FactCheckAdapter, GoogleNewsAdapter, NewsApiAdapter,
    NewsApiFallbackAdapter, SdgAdapter, SdgFallbackAdapter, SerpApiNewsAdapter, SourceAdapter,
    SourceMetadata, StatGovAdapter, StatGovFallbackAdapter, XApiAdapter, XApiFallbackAdapter,
};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::Config;
use crate::http_client::{ResilientHttpClient, SourceHttpClient};
use crate::schemas::{SearchRequest, SourceCategory, SourceId};

/// A primary adapter and its optional fallback
#[derive(Clone)]
pub struct RegisteredSource {
    pub primary: Arc<dyn SourceAdapter>,
    pub fallback: Option<Arc<dyn SourceAdapter>>,
}

impl RegisteredSource {
    pub fn new(primary: Arc<dyn SourceAdapter>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn SourceAdapter>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn id(&self) -> &SourceId {
        self.primary.id()
    }

    pub fn metadata(&self) -> &SourceMetadata {
        self.primary.metadata()
    }

    pub fn category(&self) -> SourceCategory {
        self.primary.metadata().category
    }
}

impl std::fmt::Debug for RegisteredSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredSource")
            .field("id", self.id())
            .field("fallback", &self.fallback.as_ref().map(|a| a.name().to_string()))
            .finish()
    }
}

/// Sources selected for one request
#[derive(Debug, Default)]
pub struct EffectiveSources<'a> {
    /// Known sources in registry priority order
    pub sources: Vec<&'a RegisteredSource>,
    /// Requested ids absent from the registry, in request order
    pub unknown: Vec<SourceId>,
}

/// Builder collecting sources in priority order
#[derive(Default)]
pub struct SourceRegistryBuilder {
    sources: Vec<RegisteredSource>,
}

impl SourceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self, primary: Arc<dyn SourceAdapter>) -> Self {
        self.register_source(RegisteredSource::new(primary))
    }

    pub fn register_with_fallback(
        self,
        primary: Arc<dyn SourceAdapter>,
        fallback: Arc<dyn SourceAdapter>,
    ) -> Self {
        self.register_source(RegisteredSource::new(primary).with_fallback(fallback))
    }

    /// Adds a source; a repeated id keeps the first registration
    pub fn register_source(mut self, source: RegisteredSource) -> Self {
        if self.sources.iter().any(|s| s.id() == source.id()) {
            warn!(source = %source.id(), "Source already registered, ignoring duplicate");
            return self;
        }
        self.sources.push(source);
        self
    }

    pub fn build(self) -> SourceRegistry {
        SourceRegistry {
            sources: self.sources,
        }
    }
}

/// Immutable registry of sources in priority order
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<RegisteredSource>,
}

impl SourceRegistry {
    pub fn builder() -> SourceRegistryBuilder {
        SourceRegistryBuilder::new()
    }

    /// Registers every provider with credentials and base URLs from `config`
    ///
    /// Sources without credentials are still registered; their calls end in
    /// an `AuthError` and they are reported as failed.
    pub fn from_config(config: &Config, client: Arc<ResilientHttpClient>) -> Self {
        let breaker_config = config.circuit_breaker_config();
        let http = |id: &str, route: &str| {
            source_http(client.clone(), id, route, breaker_config.as_ref())
        };

        let registry = Self::builder()
            .register_with_fallback(
                Arc::new(NewsApiAdapter::new(
                    http(SourceId::NEWSAPI, "primary"),
                    &config.newsapi_base_url,
                    config.news_api_key.clone(),
                )),
                Arc::new(NewsApiFallbackAdapter::new(
                    http(SourceId::NEWSAPI, "fallback"),
                    &config.newsapi_base_url,
                    config.news_api_key.clone(),
                )),
            )
            .register_with_fallback(
                Arc::new(GoogleNewsAdapter::new(
                    http(SourceId::GOOGLE_NEWS, "primary"),
                    &config.google_news_base_url,
                    config.google_news_api_key.clone(),
                )),
                Arc::new(SerpApiNewsAdapter::new(
                    http(SourceId::GOOGLE_NEWS, "fallback"),
                    &config.serpapi_base_url,
                    config.serp_api_key.clone(),
                )),
            )
            .register(Arc::new(FactCheckAdapter::new(
                http(SourceId::GOOGLE_FACT_CHECK, "primary"),
                &config.fact_check_base_url,
                config.google_fact_check_api_key.clone(),
            )))
            .register_with_fallback(
                Arc::new(XApiAdapter::new(
                    http(SourceId::TWITTER, "primary"),
                    &config.twitter_base_url,
                    config.twitter_bearer_token.clone(),
                )),
                Arc::new(XApiFallbackAdapter::new(
                    http(SourceId::TWITTER, "fallback"),
                    &config.twitter_base_url,
                    config.twitter_bearer_token.clone(),
                )),
            )
            .register_with_fallback(
                Arc::new(DaneGovAdapter::new(
                    http(SourceId::DANE_GOV_PL, "primary"),
                    &config.dane_gov_base_url,
                    config.dane_gov_api_key.clone(),
                )),
                Arc::new(DaneGovFallbackAdapter::new(
                    http(SourceId::DANE_GOV_PL, "fallback"),
                    &config.dane_gov_base_url,
                    config.dane_gov_api_key.clone(),
                )),
            )
            .register_with_fallback(
                Arc::new(StatGovAdapter::new(
                    http(SourceId::STAT_GOV_POLAND, "primary"),
                    &config.stat_gov_base_url,
                    config.stat_gov_api_key.clone(),
                )),
                Arc::new(StatGovFallbackAdapter::new(
                    http(SourceId::STAT_GOV_POLAND, "fallback"),
                    &config.stat_gov_base_url,
                    config.stat_gov_api_key.clone(),
                )),
            )
            .register_with_fallback(
                Arc::new(SdgAdapter::new(
                    http(SourceId::SDG_POLAND, "primary"),
                    &config.sdg_base_url,
                    config.sdg_api_token.clone(),
                )),
                Arc::new(SdgFallbackAdapter::new(
                    http(SourceId::SDG_POLAND, "fallback"),
                    &config.sdg_base_url,
                    config.sdg_api_token.clone(),
                )),
            )
            .build();

        for source in registry.iter() {
            if !source.primary.is_configured() {
                warn!(source = %source.id(), "Source has no credentials configured");
            }
        }
        info!(
            sources = registry.len(),
            circuit_breaker = breaker_config.is_some(),
            "Source registry initialized"
        );

        registry
    }

    pub fn get(&self, id: &SourceId) -> Option<&RegisteredSource> {
        self.sources.iter().find(|s| s.id() == id)
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.id().clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSource> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Resolves the sources one request should query
    ///
    /// `source` wins over `enabled_sources`; neither means every registered
    /// source. `source_category` then narrows the set. Known sources come back
    /// in registry order without duplicates.
    pub fn resolve(&self, request: &SearchRequest) -> EffectiveSources<'_> {
        let requested: Option<Vec<&SourceId>> = match &request.source {
            Some(id) => Some(vec![id]),
            None if !request.enabled_sources.is_empty() => {
                Some(request.enabled_sources.iter().collect())
            }
            None => None,
        };

        let mut unknown: Vec<SourceId> = Vec::new();
        let selected: Option<HashSet<&SourceId>> = requested.map(|ids| {
            for id in &ids {
                if !self.contains(id) && !unknown.contains(id) {
                    unknown.push((*id).clone());
                }
            }
            ids.into_iter().collect()
        });

        let sources = self
            .sources
            .iter()
            .filter(|s| selected.as_ref().map_or(true, |set| set.contains(s.id())))
            .filter(|s| request.source_category.map_or(true, |c| s.category() == c))
            .collect();

        EffectiveSources { sources, unknown }
    }
}

fn source_http(
    client: Arc<ResilientHttpClient>,
    id: &str,
    route: &str,
    breaker: Option<&CircuitBreakerConfig>,
) -> SourceHttpClient {
    let http = SourceHttpClient::new(client, id);
    match breaker {
        Some(config) => http.with_circuit_breaker(Arc::new(CircuitBreaker::new(
            format!("{}:{}", id, route),
            config.clone(),
        ))),
        None => http,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::sources::SourcePage;
    use async_trait::async_trait;

    struct StubAdapter {
        metadata: SourceMetadata,
    }

    impl StubAdapter {
        fn arc(id: &str, category: SourceCategory) -> Arc<dyn SourceAdapter> {
            Arc::new(Self {
                metadata: SourceMetadata {
                    id: SourceId::from(id),
                    name: id.to_string(),
                    description: String::new(),
                    category,
                    homepage: String::new(),
                    supports_pagination: true,
                },
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn metadata(&self) -> &SourceMetadata {
            &self.metadata
        }

        async fn fetch(&self, _request: &SearchRequest) -> Result<SourcePage, AdapterError> {
            Ok(SourcePage::empty())
        }
    }

    fn registry() -> SourceRegistry {
        SourceRegistry::builder()
            .register(StubAdapter::arc("newsapi", SourceCategory::News))
            .register_with_fallback(
                StubAdapter::arc("twitter", SourceCategory::Social),
                StubAdapter::arc("twitter", SourceCategory::Social),
            )
            .register(StubAdapter::arc("stat-gov-poland", SourceCategory::Government))
            .register(StubAdapter::arc("dane-gov-pl", SourceCategory::Government))
            .build()
    }

    fn ids(effective: &EffectiveSources<'_>) -> Vec<String> {
        effective.sources.iter().map(|s| s.id().to_string()).collect()
    }

    #[test]
    fn test_all_sources_by_default() {
        let registry = registry();
        let effective = registry.resolve(&SearchRequest::new("smog"));
        assert_eq!(ids(&effective), vec!["newsapi", "twitter", "stat-gov-poland", "dane-gov-pl"]);
        assert!(effective.unknown.is_empty());
        assert!(registry.get(&SourceId::from("twitter")).unwrap().fallback.is_some());
    }

    #[test]
    fn test_enabled_sources_follow_priority_order() {
        let registry = registry();
        let request = SearchRequest::new("smog").with_sources(vec![
            SourceId::from("dane-gov-pl"),
            SourceId::from("newsapi"),
            SourceId::from("dane-gov-pl"),
        ]);
        assert_eq!(ids(&registry.resolve(&request)), vec!["newsapi", "dane-gov-pl"]);
    }

    #[test]
    fn test_source_override_wins() {
        let registry = registry();
        let request = SearchRequest::new("smog")
            .with_sources(vec![SourceId::from("newsapi")])
            .with_source(SourceId::from("twitter"));
        assert_eq!(ids(&registry.resolve(&request)), vec!["twitter"]);
    }

    #[test]
    fn test_unknown_ids_reported_once() {
        let registry = registry();
        let request = SearchRequest::new("smog").with_sources(vec![
            SourceId::from("bing"),
            SourceId::from("newsapi"),
            SourceId::from("bing"),
        ]);
        let effective = registry.resolve(&request);
        assert_eq!(ids(&effective), vec!["newsapi"]);
        assert_eq!(effective.unknown, vec![SourceId::from("bing")]);
    }

    #[test]
    fn test_category_filter() {
        let registry = registry();
        let request = SearchRequest::new("smog").with_source_category(SourceCategory::Government);
        assert_eq!(ids(&registry.resolve(&request)), vec!["stat-gov-poland", "dane-gov-pl"]);

        let request = SearchRequest::new("smog")
            .with_sources(vec![SourceId::from("newsapi"), SourceId::from("dane-gov-pl")])
            .with_source_category(SourceCategory::News);
        assert_eq!(ids(&registry.resolve(&request)), vec!["newsapi"]);
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let registry = SourceRegistry::builder()
            .register(StubAdapter::arc("newsapi", SourceCategory::News))
            .register(StubAdapter::arc("newsapi", SourceCategory::Social))
            .build();
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&SourceId::from("newsapi")).unwrap().category(),
            SourceCategory::News
        );
    }

    #[test]
    fn test_from_config_registers_every_provider() {
        let client = Arc::new(ResilientHttpClient::with_defaults().unwrap());
        let registry = SourceRegistry::from_config(&Config::default(), client);
        let ids: Vec<String> = registry.ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "newsapi",
                "google-news",
                "google-fact-check",
                "twitter",
                "dane-gov-pl",
                "stat-gov-poland",
                "sdg-poland"
            ]
        );
        assert!(registry
            .get(&SourceId::from(SourceId::GOOGLE_FACT_CHECK))
            .unwrap()
            .fallback
            .is_none());
    }
}
