//! dane.gov.pl Source
//!
//! Open datasets published on the Polish open data portal.
//! - Primary: `/1.4/datasets`, anonymous or with a Bearer key
//! - Fallback: `/api/v1/datasets` (JSON:API shape), key required
//!
//! Dataset fields arrive either flat or under JSON:API `attributes`;
//! both shapes are accepted by both routes.

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    clean, endpoint, require_credential, require_query, SourceAdapter, SourceMetadata, SourcePage,
};
use crate::error::AdapterError;
use crate::http_client::SourceHttpClient;
use crate::identity::synthesize_id;
use crate::schemas::{
    DatasetDetails, DatasetResource, Reliability, ResultDetails, SearchRequest, SearchResult,
    SortBy, SortOrder, SourceCategory, SourceId, SourceInfo,
};

const PORTAL_URL: &str = "https://dane.gov.pl";
const PORTAL_ICON: &str = "https://dane.gov.pl/images/logo.svg";
const DEFAULT_LANG: &str = "pl";

// ============================================
// WIRE MODEL
// ============================================

#[derive(Debug, Deserialize)]
struct DatasetListResponse {
    #[serde(default)]
    data: Vec<DaneGovDataset>,
    meta: Option<ListMeta>,
}

#[derive(Debug, Deserialize)]
struct ListMeta {
    count: Option<u64>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DaneGovDataset {
    id: Option<serde_json::Value>,
    #[serde(flatten)]
    fields: DatasetFields,
    attributes: Option<DatasetFields>,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetFields {
    title: Option<String>,
    notes: Option<String>,
    description: Option<String>,
    url: Option<String>,
    organization: Option<NamedValue>,
    institution: Option<NamedValue>,
    #[serde(default)]
    resources: Vec<RawResource>,
    #[serde(default)]
    tags: Vec<NamedValue>,
    #[serde(default)]
    formats: Vec<String>,
    format: Option<String>,
    modified: Option<String>,
    last_update: Option<String>,
    created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    name: Option<String>,
    title: Option<String>,
    format: Option<String>,
    url: Option<String>,
}

/// Either `{"name": ..}` / `{"title": ..}` or a bare string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NamedValue {
    Plain(String),
    Object {
        name: Option<String>,
        title: Option<String>,
    },
}

impl NamedValue {
    fn into_text(self) -> Option<String> {
        match self {
            NamedValue::Plain(s) => clean(Some(s)),
            NamedValue::Object { name, title } => clean(title).or_else(|| clean(name)),
        }
    }
}

impl DatasetFields {
    /// Prefers JSON:API attributes over top-level fields
    fn merge(primary: DatasetFields, secondary: DatasetFields) -> DatasetFields {
        DatasetFields {
            title: primary.title.or(secondary.title),
            notes: primary.notes.or(secondary.notes),
            description: primary.description.or(secondary.description),
            url: primary.url.or(secondary.url),
            organization: primary.organization.or(secondary.organization),
            institution: primary.institution.or(secondary.institution),
            resources: if primary.resources.is_empty() {
                secondary.resources
            } else {
                primary.resources
            },
            tags: if primary.tags.is_empty() {
                secondary.tags
            } else {
                primary.tags
            },
            formats: if primary.formats.is_empty() {
                secondary.formats
            } else {
                primary.formats
            },
            format: primary.format.or(secondary.format),
            modified: primary.modified.or(secondary.modified),
            last_update: primary.last_update.or(secondary.last_update),
            created: primary.created.or(secondary.created),
        }
    }
}

fn id_text(id: &Option<serde_json::Value>) -> Option<String> {
    match id {
        Some(serde_json::Value::String(s)) => clean(Some(s.clone())),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn map_datasets(response: DatasetListResponse) -> SourcePage {
    let total = response.meta.and_then(|m| m.count.or(m.total));

    let items: Vec<SearchResult> = response
        .data
        .into_iter()
        .enumerate()
        .map(|(index, dataset)| {
            let upstream_id = id_text(&dataset.id);
            let fields = match dataset.attributes {
                Some(attributes) => DatasetFields::merge(attributes, dataset.fields),
                None => dataset.fields,
            };

            let resources: Vec<DatasetResource> = fields
                .resources
                .into_iter()
                .filter_map(|r| {
                    let name = clean(r.name).or_else(|| clean(r.title))?;
                    Some(DatasetResource {
                        name,
                        format: clean(r.format).map(|f| f.to_lowercase()),
                        url: clean(r.url),
                    })
                })
                .collect();

            let format = clean(fields.format)
                .or_else(|| fields.formats.into_iter().find(|f| !f.trim().is_empty()))
                .or_else(|| resources.iter().find_map(|r| r.format.clone()))
                .map(|f| f.to_lowercase());

            let url = clean(fields.url)
                .or_else(|| resources.iter().find_map(|r| r.url.clone()))
                .or_else(|| upstream_id.as_ref().map(|id| format!("{}/pl/dataset/{}", PORTAL_URL, id)))
                .unwrap_or_else(|| PORTAL_URL.to_string());

            let title = clean(fields.title).unwrap_or_else(|| url.clone());

            SearchResult::new(
                synthesize_id(SourceId::DANE_GOV_PL, upstream_id.as_deref(), &url, &title, index),
                title,
                url,
                SourceInfo::new("DANE.GOV.PL", PORTAL_URL)
                    .with_icon(PORTAL_ICON)
                    .with_reliability(Reliability::High),
                ResultDetails::Dataset(DatasetDetails {
                    publisher: fields
                        .organization
                        .or(fields.institution)
                        .and_then(NamedValue::into_text),
                    format,
                    resources,
                    tags: fields
                        .tags
                        .into_iter()
                        .filter_map(NamedValue::into_text)
                        .collect(),
                }),
            )
            .with_description(clean(fields.notes).or(fields.description))
            .with_date(fields.modified.or(fields.last_update).or(fields.created))
            .with_source_id(SourceId::from(SourceId::DANE_GOV_PL))
        })
        .collect();

    SourcePage::new(items, total)
}

fn portal_sort(sort_by: SortBy, order: SortOrder) -> &'static str {
    match (sort_by, order) {
        (SortBy::Relevance, _) => "relevance",
        (SortBy::Date, SortOrder::Desc) => "-created",
        (SortBy::Date, SortOrder::Asc) => "created",
        (SortBy::Popularity, _) => "-views_count",
    }
}

fn metadata(name: &str) -> SourceMetadata {
    SourceMetadata {
        id: SourceId::from(SourceId::DANE_GOV_PL),
        name: name.to_string(),
        description: "Open datasets from the Polish public data portal".to_string(),
        category: SourceCategory::Government,
        homepage: PORTAL_URL.to_string(),
        supports_pagination: true,
    }
}

// ============================================
// PRIMARY
// ============================================

pub struct DaneGovAdapter {
    http: SourceHttpClient,
    base_url: String,
    api_key: Option<String>,
    metadata: SourceMetadata,
}

impl DaneGovAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            metadata: metadata("DANE.GOV.PL"),
        }
    }
}

#[async_trait]
impl SourceAdapter for DaneGovAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let query = require_query(request, SourceId::DANE_GOV_PL)?;

        let mut params = vec![
            ("q", query.to_string()),
            ("page", request.page.to_string()),
            ("per_page", request.page_size.to_string()),
            ("sort", portal_sort(request.sort_by, request.sort_order).to_string()),
            (
                "lang",
                request.language.clone().unwrap_or_else(|| DEFAULT_LANG.to_string()),
            ),
        ];
        if let Some(category) = &request.category {
            params.push(("category", category.clone()));
        }

        let url = endpoint(&self.base_url, "/1.4/datasets");
        let mut builder = self
            .http
            .get(&url)
            .query(&params)
            .header("Accept", "application/json");
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response: DatasetListResponse = self.http.get_json(builder).await?;
        Ok(map_datasets(response))
    }
}

// ============================================
// FALLBACK
// ============================================

pub struct DaneGovFallbackAdapter {
    http: SourceHttpClient,
    base_url: String,
    api_key: Option<String>,
    metadata: SourceMetadata,
}

impl DaneGovFallbackAdapter {
    pub fn new(http: SourceHttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            metadata: metadata("DANE.GOV.PL (v1)"),
        }
    }
}

#[async_trait]
impl SourceAdapter for DaneGovFallbackAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SourcePage, AdapterError> {
        let query = require_query(request, SourceId::DANE_GOV_PL)?;
        let api_key = require_credential(&self.api_key, "DANE_GOV_API_KEY")?;

        let mut params = vec![
            ("q", query.to_string()),
            ("page", request.page.to_string()),
            ("per_page", request.page_size.to_string()),
        ];
        if let Some(category) = &request.category {
            params.push(("category", category.clone()));
        }

        let url = endpoint(&self.base_url, "/api/v1/datasets");
        let builder = self
            .http
            .get(&url)
            .query(&params)
            .header("Accept", "application/json")
            .bearer_auth(api_key);

        let response: DatasetListResponse = self.http.get_json(builder).await?;
        Ok(map_datasets(response))
    }
}
