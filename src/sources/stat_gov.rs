//! Statistics Poland (GUS) Source
//!
//! Indicators from the GUS dissemination API (`api-dbw.stat.gov.pl`).
//! - Primary: `/api/1.1.0/indicators`
//! - Fallback: `/api/1.1.0/search` for keyword queries, `/indicators` otherwise
//!
//! The optional client id travels in the `X-ClientId` header.

use async_trait::async_trait;
use serde::Deserialize;

use super::{clean, endpoint, SourceAdapter, SourceMetadata, SourcePage};
use crate::error::AdapterError;
use crate::http_client::SourceHttpClient;
use crate::identity::synthesize_id;
use crate::schemas::{
    GovernmentDataDetails, Reliability, ResultDetails, SearchRequest, SearchResult, SourceCategory,
    SourceId, SourceInfo,
};

const API_PREFIX: &str = "/api/1.1.0";
const GUS_URL: &str = "https://stat.gov.pl";
const GUS_ICON: &str = "https://stat.gov.pl/images/logo_gus_en.svg";
const GUS_NAME: &str = "Statistics Poland (GUS)";
const DEFAULT_LANG: &str = "pl";

#[derive(Debug, Deserialize)]
struct IndicatorListResponse {
    #[serde(default)]
    results: Vec<Indicator>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Indicator {
    id: Option<serde_json::Value>,
    title: Option<String>,
    name: Option<String>,
    description: Option<String>,
    notes: Option<String>,
    url: Option<String>,
    topic_id: Option<serde_json::Value>,
    area: Option<String>,
    topic: Option<String>,
    source: Option<String>,
    value: Option<serde_json::Value>,
    unit: Option<String>,
    last_update: Option<String>,
}

fn scalar_text(value: &Option<serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) => clean(Some(s.clone())),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn map_indicators(response: IndicatorListResponse) -> SourcePage {
    let items: Vec<SearchResult> = response
        .results
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let upstream_id = scalar_text(&item.id);
            let url = clean(item.url).unwrap_or_else(|| match scalar_text(&item.topic_id) {
                Some(topic) => format!("{}/en/topics/{}", GUS_URL, topic),
                None => GUS_URL.to_string(),
            });
            let title = clean(item.title)
                .or_else(|| clean(item.name))
                .unwrap_or_else(|| url.clone());
            let last_update = clean(item.last_update);

            SearchResult::new(
                synthesize_id(SourceId::STAT_GOV_POLAND, upstream_id.as_deref(), &url, &title, index),
                title,
                url,
                SourceInfo::new(GUS_NAME, GUS_URL)
                    .with_icon(GUS_ICON)
                    .with_reliability(Reliability::High),
                ResultDetails::GovernmentData(GovernmentDataDetails {
                    institution: clean(item.source).or_else(|| Some(GUS_NAME.to_string())),
                    category: clean(item.area).or_else(|| clean(item.topic)),
                    publication_date: last_update.clone(),
                    value: item.value.filter(|v| !v.is_null()),
                    unit: clean(item.unit),
                }),
            )
            .with_description(clean(item.description).or(item.notes))
            .with_date(last_update)
            .with_source_id(SourceId::from(SourceId::STAT_GOV_POLAND))
        })
        .collect();

    SourcePage::new(items, response.total)
}

fn metadata(name: &str) -> SourceMetadata {
    SourceMetadata {
        id: SourceId::from(SourceId::STAT_GOV_POLAND),
        name: name.to_string(),
        description: "Official statistics published by Statistics Poland".to_string(),
        category: SourceCategory::Government,
        homepage: GUS_URL.to_string(),
        supports_pagination: true,
    }
}

fn common_params(request: &SearchRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", request.page.to_string()),
        ("page_size", request.page_size.to_string()),
        (
            "lang",
            request.language.clone().unwrap_or_else(|| DEFAULT_LANG.to_string()),
        ),
        ("format", "json".to_string()),
    ];
    let query = request.query.trim();
    if !query.is_empty() {
        params.push(("q", query.to_string()));
    }
    params
}

async fn fetch_indicators(
    http: &SourceHttpClient,
    url: &str,
    client_id: Option<&str>,
    params: &[(&'static str, String)],
) -> Result<SourcePage, AdapterError> {
    let mut builder = http
        .get(url)
        .query(params)
        .header("Accept", "application/json");
    if let Some(id) = client_id.filter(|id| !id.trim().is_empty()) {
        builder = builder.header("X-ClientId", id);
    }
    let response: IndicatorListResponse = http.get_json(builder).await?;
    Ok(map_indicators(response))
}

// ============================================
// PRIMARY
// ============================================

pub struct StatGovAdapter {
    http: SourceHttpClient,
    base_url: String,
    client_id: Option<String>,
    metadata: SourceMetadata,
}

impl StatGovAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            client_id,
            metadata: metadata(GUS_NAME),
        }
    }
}

#[async_trait]
impl SourceAdapter for StatGovAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let url = endpoint(&self.base_url, &format!("{}/indicators", API_PREFIX));
        fetch_indicators(&self.http, &url, self.client_id.as_deref(), &common_params(request)).await
    }
}

// ============================================
// FALLBACK
// ============================================

pub struct StatGovFallbackAdapter {
    http: SourceHttpClient,
    base_url: String,
    client_id: Option<String>,
    metadata: SourceMetadata,
}

impl StatGovFallbackAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            client_id,
            metadata: metadata("Statistics Poland (GUS search)"),
        }
    }

    fn path_for(request: &SearchRequest) -> String {
        if request.is_blank() {
            format!("{}/indicators", API_PREFIX)
        } else {
            format!("{}/search", API_PREFIX)
        }
    }
}

#[async_trait]
impl SourceAdapter for StatGovFallbackAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let mut params = common_params(request);
        params.push(("sort_by", request.sort_by.as_str().to_string()));
        params.push(("sort_order", request.sort_order.as_str().to_string()));

        let url = endpoint(&self.base_url, &Self::path_for(request));
        fetch_indicators(&self.http, &url, self.client_id.as_deref(), &params).await
    }
}
