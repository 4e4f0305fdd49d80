//! NewsAPI Source
//!
//! Searches news articles through NewsAPI.org
//! https://newsapi.org/docs/endpoints/everything
//!
//! The response model is shared with the Google News adapter, which talks to
//! a NewsAPI-compatible endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    clean, endpoint, require_credential, require_query, SourceAdapter, SourceMetadata, SourcePage,
};
use crate::error::AdapterError;
use crate::http_client::SourceHttpClient;
use crate::identity::{host_of, origin_of, synthesize_id};
use crate::schemas::{
    NewsDetails, ResultDetails, SearchRequest, SearchResult, SortBy, SourceCategory, SourceId,
    SourceInfo,
};

const EVERYTHING_PATH: &str = "/v2/everything";

// ============================================
// WIRE MODEL
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewsApiResponse {
    pub status: Option<String>,
    pub total_results: Option<u64>,
    #[serde(default)]
    pub articles: Vec<NewsApiArticle>,
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewsApiArticle {
    #[serde(default)]
    pub source: ArticleSource,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ArticleSource {
    pub name: Option<String>,
}

/// NewsAPI's `sortBy` value for a canonical sort key
pub(crate) fn newsapi_sort(sort_by: SortBy) -> &'static str {
    match sort_by {
        SortBy::Relevance => "relevancy",
        SortBy::Date => "publishedAt",
        SortBy::Popularity => "popularity",
    }
}

/// Validates the envelope and maps articles into news results
pub(crate) fn into_page(
    source: &str,
    response: NewsApiResponse,
    category: Option<&str>,
) -> Result<SourcePage, AdapterError> {
    if response.status.as_deref() == Some("error") {
        return Err(AdapterError::UpstreamError {
            status: 200,
            message: format!(
                "{}: {}",
                response.code.unwrap_or_else(|| "error".to_string()),
                response.message.unwrap_or_default()
            ),
        });
    }

    let items = map_articles(source, response.articles, category);
    Ok(SourcePage::new(items, response.total_results))
}

pub(crate) fn map_articles(
    source: &str,
    articles: Vec<NewsApiArticle>,
    category: Option<&str>,
) -> Vec<SearchResult> {
    articles
        .into_iter()
        // NewsAPI blanks out articles withdrawn by the publisher
        .filter(|a| a.title.as_deref() != Some("[Removed]"))
        .filter_map(|mut article| {
            let url = clean(article.url.take())?;
            Some((url, article))
        })
        .enumerate()
        .map(|(index, (url, article))| {
            let title = clean(article.title).unwrap_or_else(|| url.clone());
            let publisher_name = clean(article.source.name)
                .or_else(|| host_of(&url))
                .unwrap_or_else(|| source.to_string());
            let publisher_url = origin_of(&url).unwrap_or_else(|| url.clone());

            SearchResult::new(
                synthesize_id(source, None, &url, &title, index),
                title,
                url,
                SourceInfo::new(publisher_name, publisher_url),
                ResultDetails::News(NewsDetails {
                    author: clean(article.author),
                    image_url: clean(article.url_to_image),
                    category: category.map(str::to_string),
                }),
            )
            .with_description(article.description)
            .with_date(article.published_at)
            .with_source_id(SourceId::from(source))
        })
        .collect()
}

fn metadata(name: &str) -> SourceMetadata {
    SourceMetadata {
        id: SourceId::from(SourceId::NEWSAPI),
        name: name.to_string(),
        description: "Worldwide news articles from NewsAPI.org".to_string(),
        category: SourceCategory::News,
        homepage: "https://newsapi.org".to_string(),
        supports_pagination: true,
    }
}

/// Parameters both NewsAPI routes send
fn base_params(request: &SearchRequest, query: &str) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("q", query.to_string()),
        ("page", request.page.to_string()),
        ("pageSize", request.page_size.to_string()),
        ("sortBy", newsapi_sort(request.sort_by).to_string()),
    ];
    if let Some(language) = &request.language {
        params.push(("language", language.clone()));
    }
    if let Some(from) = request.date_from {
        params.push(("from", from.to_string()));
    }
    if let Some(to) = request.date_to {
        params.push(("to", to.to_string()));
    }
    params
}

// ============================================
// PRIMARY
// ============================================

/// NewsAPI `/v2/everything` with the full filter set
pub struct NewsApiAdapter {
    http: SourceHttpClient,
    base_url: String,
    api_key: Option<String>,
    metadata: SourceMetadata,
}

impl NewsApiAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            metadata: metadata("NewsAPI"),
        }
    }
}

#[async_trait]
impl SourceAdapter for NewsApiAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let query = require_query(request, SourceId::NEWSAPI)?;
        let api_key = require_credential(&self.api_key, "NEWS_API_KEY")?;

        let mut params = base_params(request, query);
        // NewsAPI only honours these on open-ended searches
        if request.enabled_sources.is_empty() && request.source.is_none() {
            if let Some(country) = &request.country {
                params.push(("country", country.clone()));
            }
            if let Some(category) = &request.category {
                params.push(("category", category.clone()));
            }
        }
        params.push(("apiKey", api_key.to_string()));

        debug!(source = SourceId::NEWSAPI, page = request.page, "Querying NewsAPI");

        let url = endpoint(&self.base_url, EVERYTHING_PATH);
        let response: NewsApiResponse = self.http.get_json(self.http.get(&url).query(&params)).await?;
        into_page(SourceId::NEWSAPI, response, request.category.as_deref())
    }
}

// ============================================
// FALLBACK
// ============================================

/// NewsAPI `/v2/everything` with only the core search parameters
pub struct NewsApiFallbackAdapter {
    http: SourceHttpClient,
    base_url: String,
    api_key: Option<String>,
    metadata: SourceMetadata,
}

impl NewsApiFallbackAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            metadata: metadata("NewsAPI (reduced)"),
        }
    }
}

#[async_trait]
impl SourceAdapter for NewsApiFallbackAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let query = require_query(request, SourceId::NEWSAPI)?;
        let api_key = require_credential(&self.api_key, "NEWS_API_KEY")?;

        let url = endpoint(&self.base_url, EVERYTHING_PATH);
        let builder = self
            .http
            .get(&url)
            .query(&base_params(request, query))
            .header("X-Api-Key", api_key);

        let response: NewsApiResponse = self.http.get_json(builder).await?;
        into_page(SourceId::NEWSAPI, response, None)
    }
}
