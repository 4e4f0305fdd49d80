//! Google News Source
//!
//! - Primary: NewsAPI-compatible `/v2/everything`, authenticated with `X-Api-Key`
//! - Fallback: SerpAPI `google_news` engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::newsapi::{into_page, NewsApiResponse};
use super::{
    clean, endpoint, require_credential, require_query, SourceAdapter, SourceMetadata, SourcePage,
};
use crate::error::AdapterError;
use crate::http_client::SourceHttpClient;
use crate::identity::{host_of, origin_of, synthesize_id};
use crate::schemas::{
    NewsDetails, ResultDetails, SearchRequest, SearchResult, SourceCategory, SourceId, SourceInfo,
};

fn metadata(name: &str) -> SourceMetadata {
    SourceMetadata {
        id: SourceId::from(SourceId::GOOGLE_NEWS),
        name: name.to_string(),
        description: "Google News coverage".to_string(),
        category: SourceCategory::News,
        homepage: "https://news.google.com".to_string(),
        supports_pagination: true,
    }
}

// ============================================
// PRIMARY
// ============================================

pub struct GoogleNewsAdapter {
    http: SourceHttpClient,
    base_url: String,
    api_key: Option<String>,
    metadata: SourceMetadata,
}

impl GoogleNewsAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            metadata: metadata("Google News"),
        }
    }
}

#[async_trait]
impl SourceAdapter for GoogleNewsAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let query = require_query(request, SourceId::GOOGLE_NEWS)?;
        let api_key = require_credential(&self.api_key, "GOOGLE_NEWS_API_KEY")?;

        let mut params = vec![
            ("q", query.to_string()),
            ("page", request.page.to_string()),
            ("pageSize", request.page_size.to_string()),
        ];
        if let Some(language) = &request.language {
            params.push(("language", language.clone()));
        }

        let url = endpoint(&self.base_url, "/v2/everything");
        let builder = self.http.get(&url).query(&params).header("X-Api-Key", api_key);

        let response: NewsApiResponse = self.http.get_json(builder).await?;
        into_page(SourceId::GOOGLE_NEWS, response, None)
    }
}

// ============================================
// FALLBACK (SerpAPI)
// ============================================

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    articles: Vec<SerpApiArticle>,
    #[serde(default)]
    news_results: Vec<SerpApiArticle>,
    search_information: Option<SearchInformation>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchInformation {
    total_results: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SerpApiArticle {
    link: Option<String>,
    title: Option<String>,
    snippet: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
    date: Option<String>,
    source: Option<SerpSource>,
}

/// SerpAPI reports the publisher either as an object or as a bare name
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SerpSource {
    Named { name: Option<String> },
    Plain(String),
}

impl SerpSource {
    fn into_name(self) -> Option<String> {
        match self {
            SerpSource::Named { name } => name,
            SerpSource::Plain(name) => Some(name),
        }
    }
}

/// Normalizes SerpAPI's `MM/DD/YYYY, HH:MM AM, +0000 UTC` dates to RFC 3339
fn normalize_serp_date(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches(" UTC");
    DateTime::parse_from_str(trimmed, "%m/%d/%Y, %I:%M %p, %z")
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339())
        .unwrap_or_else(|_| raw.trim().to_string())
}

fn map_serp_results(response: SerpApiResponse) -> Result<SourcePage, AdapterError> {
    if let Some(error) = response.error {
        return Err(AdapterError::UpstreamError {
            status: 200,
            message: error,
        });
    }

    let total = response.search_information.and_then(|s| s.total_results);
    let articles = if response.articles.is_empty() {
        response.news_results
    } else {
        response.articles
    };

    let items: Vec<SearchResult> = articles
        .into_iter()
        .filter_map(|mut article| {
            let url = clean(article.link.take())?;
            Some((url, article))
        })
        .enumerate()
        .map(|(index, (url, article))| {
            let title = clean(article.title).unwrap_or_else(|| url.clone());
            let publisher = article
                .source
                .and_then(SerpSource::into_name)
                .and_then(|n| clean(Some(n)))
                .or_else(|| host_of(&url))
                .unwrap_or_else(|| "Google News".to_string());
            let publisher_url = origin_of(&url).unwrap_or_else(|| url.clone());

            SearchResult::new(
                synthesize_id(SourceId::GOOGLE_NEWS, None, &url, &title, index),
                title,
                url,
                SourceInfo::new(publisher, publisher_url),
                ResultDetails::News(NewsDetails {
                    author: None,
                    image_url: clean(article.thumbnail),
                    category: None,
                }),
            )
            .with_description(clean(article.snippet).or(article.description))
            .with_date(article.date.map(|d| normalize_serp_date(&d)))
            .with_source_id(SourceId::from(SourceId::GOOGLE_NEWS))
        })
        .collect();

    Ok(SourcePage::new(items, total))
}

pub struct SerpApiNewsAdapter {
    http: SourceHttpClient,
    base_url: String,
    api_key: Option<String>,
    metadata: SourceMetadata,
}

impl SerpApiNewsAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            metadata: metadata("Google News (SerpAPI)"),
        }
    }
}

#[async_trait]
impl SourceAdapter for SerpApiNewsAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let query = require_query(request, SourceId::GOOGLE_NEWS)?;
        let api_key = require_credential(&self.api_key, "SERP_API_KEY")?;

        let start = (request.page.saturating_sub(1) as u64) * request.page_size as u64;
        let mut params = vec![
            ("engine", "google_news".to_string()),
            ("q", query.to_string()),
            ("api_key", api_key.to_string()),
            ("num", request.page_size.to_string()),
            ("start", start.to_string()),
        ];
        if let Some(language) = &request.language {
            params.push(("hl", language.clone()));
        }

        let url = endpoint(&self.base_url, "/search.json");
        let response: SerpApiResponse = self.http.get_json(self.http.get(&url).query(&params)).await?;
        map_serp_results(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serp_results_mapping() {
        let response: SerpApiResponse = serde_json::from_value(serde_json::json!({
            "search_information": {"total_results": 120},
            "news_results": [
                {
                    "link": "https://wyborcza.pl/7,1.html",
                    "title": "Smog nad Krakowem",
                    "snippet": "Normy przekroczone",
                    "source": {"name": "Gazeta Wyborcza"},
                    "date": "11/20/2024, 08:00 AM, +0000 UTC"
                },
                {
                    "link": "https://onet.pl/x",
                    "title": "Druga",
                    "source": "Onet"
                },
                {
                    "title": "No link, dropped"
                }
            ]
        }))
        .unwrap();

        let page = map_serp_results(response).unwrap();
        assert_eq!(page.total_results, 120);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].source.name, "Gazeta Wyborcza");
        assert_eq!(page.items[0].date.as_deref(), Some("2024-11-20T08:00:00+00:00"));
        assert!(page.items[0].parsed_date().is_some());
        assert_eq!(page.items[1].source.name, "Onet");
        assert!(page.items[0].id.starts_with("google-news-"));
    }

    #[test]
    fn test_serp_error_payload() {
        let response: SerpApiResponse =
            serde_json::from_value(serde_json::json!({"error": "Invalid API key."})).unwrap();
        assert!(map_serp_results(response).is_err());
    }

    #[test]
    fn test_unparseable_serp_date_kept_verbatim() {
        assert_eq!(normalize_serp_date("2 hours ago"), "2 hours ago");
    }
}
