//! SDG Poland Source
//!
//! Sustainable Development Goal indicators published by Statistics Poland in
//! the `statisticspoland/sdg-indicators-pl` GitHub repository, read through
//! the GitHub contents API as raw JSON.
//!
//! The repository serves whole documents, so query filtering and pagination
//! happen locally. A numeric `category` between 1 and 17 selects one goal.
//! Anonymous GitHub access allows 60 requests per hour; `SDG_API_TOKEN` lifts
//! that limit.

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

const CONTENTS_PATH: &str = "/repos/statisticspoland/sdg-indicators-pl/contents/api/v1";
const ALL_INDICATORS: &str = "/globalne_dane.json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.v3.raw";
const SDG_URL: &str = "https://sdg.gov.pl";
const SDG_ICON: &str = "https://sdg.gov.pl/assets/images/logo.png";
const GOALS: std::ops::RangeInclusive<u8> = 1..=17;

/// A goal document holds a list; single-indicator documents hold one object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SdgDocument {
    Many(Vec<SdgIndicator>),
    One(Box<SdgIndicator>),
}

impl SdgDocument {
    fn into_vec(self) -> Vec<SdgIndicator> {
        match self {
            SdgDocument::Many(items) => items,
            SdgDocument::One(item) => vec![*item],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SdgIndicator {
    id: Option<serde_json::Value>,
    title: Option<String>,
    description: Option<String>,
    goal: Option<serde_json::Value>,
    source: Option<serde_json::Value>,
    metadata: Option<SdgIndicatorMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct SdgIndicatorMetadata {
    description: Option<String>,
    goal: Option<serde_json::Value>,
}

fn scalar_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) => clean(Some(s.clone())),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

impl SdgIndicator {
    fn goal(&self) -> Option<String> {
        scalar_text(self.goal.as_ref())
            .or_else(|| scalar_text(self.metadata.as_ref().and_then(|m| m.goal.as_ref())))
    }

    fn description(&self) -> Option<String> {
        clean(self.description.clone())
            .or_else(|| clean(self.metadata.as_ref().and_then(|m| m.description.clone())))
    }

    fn matches(&self, needle: &str) -> bool {
        let contains = |text: &Option<String>| {
            text.as_deref()
                .map(|t| t.to_lowercase().contains(needle))
                .unwrap_or(false)
        };
        contains(&self.title)
            || contains(&self.description())
            || self.goal().map(|g| g.contains(needle)).unwrap_or(false)
    }
}

/// Goal number selected by `category`, when it names one
fn requested_goal(request: &SearchRequest) -> Option<u8> {
    request
        .category
        .as_deref()
        .and_then(|c| c.trim().parse::<u8>().ok())
        .filter(|g| GOALS.contains(g))
}

/// Filters by query (and goal), then slices the requested page
fn select_page(indicators: Vec<SdgIndicator>, request: &SearchRequest, goal: Option<u8>) -> SourcePage {
    let needle = request.query.trim().to_lowercase();
    let goal_text = goal.map(|g| g.to_string());

    let matching: Vec<SdgIndicator> = indicators
        .into_iter()
        .filter(|i| needle.is_empty() || i.matches(&needle))
        .filter(|i| match &goal_text {
            Some(g) => i.goal().as_deref().map(|ig| ig == g).unwrap_or(true),
            None => true,
        })
        .collect();

    let total = matching.len() as u64;
    let offset = (request.page.saturating_sub(1) as usize).saturating_mul(request.page_size as usize);

    let items = matching
        .into_iter()
        .enumerate()
        .skip(offset)
        .take(request.page_size as usize)
        .map(|(index, indicator)| to_result(indicator, index))
        .collect();

    SourcePage::new(items, Some(total))
}

fn to_result(indicator: SdgIndicator, index: usize) -> SearchResult {
    let upstream_id = scalar_text(indicator.id.as_ref());
    let url = match &upstream_id {
        Some(id) => format!("{}/statistics_glob/{}/", SDG_URL, id),
        None => SDG_URL.to_string(),
    };
    let title = clean(indicator.title.clone()).unwrap_or_else(|| url.clone());
    let goal = indicator.goal();

    SearchResult::new(
        synthesize_id(SourceId::SDG_POLAND, upstream_id.as_deref(), &url, &title, index),
        title,
        url,
        SourceInfo::new("SDG Poland", SDG_URL)
            .with_icon(SDG_ICON)
            .with_reliability(Reliability::High),
        ResultDetails::GovernmentData(GovernmentDataDetails {
            institution: scalar_text(indicator.source.as_ref()),
            category: goal.map(|g| format!("SDG {}", g)),
            publication_date: None,
            value: None,
            unit: None,
        }),
    )
    .with_description(indicator.description())
    .with_source_id(SourceId::from(SourceId::SDG_POLAND))
}

fn metadata(name: &str) -> SourceMetadata {
    SourceMetadata {
        id: SourceId::from(SourceId::SDG_POLAND),
        name: name.to_string(),
        description: "Sustainable Development Goal indicators for Poland".to_string(),
        category: SourceCategory::Dataset,
        homepage: SDG_URL.to_string(),
        supports_pagination: false,
    }
}

async fn fetch_document(
    http: &SourceHttpClient,
    base_url: &str,
    path: &str,
    token: Option<&str>,
) -> Result<Vec<SdgIndicator>, AdapterError> {
    let url = endpoint(base_url, &format!("{}{}", CONTENTS_PATH, path));
    let mut builder = http.get(&url).header("Accept", RAW_MEDIA_TYPE);
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        builder = builder.header("Authorization", format!("token {}", token));
    }
    let document: SdgDocument = http.get_json(builder).await?;
    Ok(document.into_vec())
}

// ============================================
// PRIMARY
// ============================================

pub struct SdgAdapter {
    http: SourceHttpClient,
    base_url: String,
    token: Option<String>,
    metadata: SourceMetadata,
}

impl SdgAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token,
            metadata: metadata("SDG Poland"),
        }
    }
}

#[async_trait]
impl SourceAdapter for SdgAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let goal = requested_goal(request);
        let path = match goal {
            Some(g) => format!("/globalne/{}.json", g),
            None => ALL_INDICATORS.to_string(),
        };

        let indicators = fetch_document(&self.http, &self.base_url, &path, self.token.as_deref()).await?;
        Ok(select_page(indicators, request, goal))
    }
}

// ============================================
// FALLBACK
// ============================================

/// Always reads the all-indicators document
pub struct SdgFallbackAdapter {
    http: SourceHttpClient,
    base_url: String,
    token: Option<String>,
    metadata: SourceMetadata,
}

impl SdgFallbackAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token,
            metadata: metadata("SDG Poland (all indicators)"),
        }
    }
}

#[async_trait]
impl SourceAdapter for SdgFallbackAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let indicators =
            fetch_document(&self.http, &self.base_url, ALL_INDICATORS, self.token.as_deref()).await?;
        Ok(select_page(indicators, request, requested_goal(request)))
    }
}
