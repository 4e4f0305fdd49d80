//! SearchRequest Schema
//!
//! `RawSearchRequest` is what arrives over HTTP or the CLI. `validate()` turns it
//! into the immutable `SearchRequest` every adapter receives, or rejects it with
//! `AggregatorError::InvalidRequest` before any source is contacted.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::common::{SourceCategory, SourceId};
use crate::error::{AggregatorError, Result};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

// ============================================
// SORTING
// ============================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Date,
    Popularity,
}

impl SortBy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "relevance" => Some(SortBy::Relevance),
            "date" => Some(SortBy::Date),
            "popularity" => Some(SortBy::Popularity),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::Date => "date",
            SortBy::Popularity => "popularity",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

// ============================================
// RAW (UNTRUSTED) REQUEST
// ============================================

/// Search parameters as submitted by a client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSearchRequest {
    #[serde(alias = "q")]
    pub query: String,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    #[serde(alias = "from")]
    pub date_from: Option<String>,
    #[serde(alias = "to")]
    pub date_to: Option<String>,
    pub source: Option<String>,
    pub category: Option<String>,
    pub source_category: Option<String>,
    #[serde(alias = "sources")]
    pub enabled_sources: Vec<String>,
}

impl RawSearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Builds a request from a URL query string
    ///
    /// `enabledSources`/`sources` take a comma-separated list and may repeat;
    /// `from`/`to` are accepted for `dateFrom`/`dateTo`. Unknown keys are ignored.
    pub fn from_query_string(query: &str) -> Result<Self> {
        let mut raw = RawSearchRequest::default();

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "query" | "q" => raw.query = value,
                "page" => raw.page = Some(parse_integer("page", &value)?),
                "pageSize" => raw.page_size = Some(parse_integer("pageSize", &value)?),
                "sortBy" => raw.sort_by = Some(value),
                "sortOrder" => raw.sort_order = Some(value),
                "language" => raw.language = Some(value),
                "country" => raw.country = Some(value),
                "dateFrom" | "from" => raw.date_from = Some(value),
                "dateTo" | "to" => raw.date_to = Some(value),
                "source" => raw.source = Some(value),
                "category" => raw.category = Some(value),
                "sourceCategory" => raw.source_category = Some(value),
                "enabledSources" | "sources" => raw
                    .enabled_sources
                    .extend(value.split(',').map(|s| s.to_string())),
                _ => {}
            }
        }

        Ok(raw)
    }

    /// Checks every field and produces the canonical request
    pub fn validate(self) -> Result<SearchRequest> {
        let page = match self.page {
            None => DEFAULT_PAGE,
            Some(p) if p >= 1 && p <= u32::MAX as i64 => p as u32,
            Some(p) => return Err(invalid(format!("page must be >= 1, got {}", p))),
        };

        let page_size = match self.page_size {
            None => DEFAULT_PAGE_SIZE,
            Some(s) if (1..=MAX_PAGE_SIZE as i64).contains(&s) => s as u32,
            Some(s) => {
                return Err(invalid(format!(
                    "pageSize must be between 1 and {}, got {}",
                    MAX_PAGE_SIZE, s
                )))
            }
        };

        let sort_by = match non_blank(self.sort_by) {
            None => SortBy::default(),
            Some(s) => SortBy::parse(&s).ok_or_else(|| invalid(format!("unknown sortBy: {}", s)))?,
        };

        let sort_order = match non_blank(self.sort_order) {
            None => SortOrder::default(),
            Some(s) => SortOrder::parse(&s)
                .ok_or_else(|| invalid(format!("unknown sortOrder: {}", s)))?,
        };

        let date_from = non_blank(self.date_from)
            .map(|d| parse_request_date("dateFrom", &d))
            .transpose()?;
        let date_to = non_blank(self.date_to)
            .map(|d| parse_request_date("dateTo", &d))
            .transpose()?;
        if let (Some(from), Some(to)) = (date_from, date_to) {
            if from > to {
                return Err(invalid(format!(
                    "dateFrom ({}) must not be after dateTo ({})",
                    from, to
                )));
            }
        }

        let source_category = match non_blank(self.source_category) {
            None => None,
            Some(c) if c.eq_ignore_ascii_case("all") => None,
            Some(c) => Some(
                SourceCategory::parse(&c)
                    .ok_or_else(|| invalid(format!("unknown sourceCategory: {}", c)))?,
            ),
        };

        let language = non_blank(self.language)
            .filter(|l| !l.eq_ignore_ascii_case("all"))
            .map(|l| l.to_lowercase());

        let enabled_sources = self
            .enabled_sources
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(SourceId::from)
            .collect();

        Ok(SearchRequest {
            query: self.query.trim().to_string(),
            page,
            page_size,
            sort_by,
            sort_order,
            language,
            country: non_blank(self.country).map(|c| c.to_lowercase()),
            date_from,
            date_to,
            source: non_blank(self.source).map(SourceId::from),
            category: non_blank(self.category),
            source_category,
            enabled_sources,
        })
    }
}

impl TryFrom<RawSearchRequest> for SearchRequest {
    type Error = AggregatorError;

    fn try_from(raw: RawSearchRequest) -> Result<Self> {
        raw.validate()
    }
}

// ============================================
// CANONICAL REQUEST
// ============================================

/// Validated search request shared read-only by every adapter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    pub page: u32,
    pub page_size: u32,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    /// `None` means no language restriction
    pub language: Option<String>,
    pub country: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Single-source override; wins over `enabled_sources`
    pub source: Option<SourceId>,
    pub category: Option<String>,
    pub source_category: Option<SourceCategory>,
    /// Empty means every registered source
    pub enabled_sources: Vec<SourceId>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            language: None,
            country: None,
            date_from: None,
            date_to: None,
            source: None,
            category: None,
            source_category: None,
            enabled_sources: Vec::new(),
        }
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn with_sort(mut self, sort_by: SortBy, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceId>,
    {
        self.enabled_sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<SourceId>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_source_category(mut self, category: SourceCategory) -> Self {
        self.source_category = Some(category);
        self
    }

    /// Whitespace-only queries never reach an adapter
    pub fn is_blank(&self) -> bool {
        self.query.trim().is_empty()
    }
}

// ============================================
// HELPERS
// ============================================

fn invalid(message: String) -> AggregatorError {
    AggregatorError::InvalidRequest(message)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_integer(field: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| invalid(format!("{} must be an integer, got {:?}", field, value)))
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (its date part is kept)
fn parse_request_date(field: &str, value: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.date_naive())
        .map_err(|_| invalid(format!("{} is not an ISO date: {:?}", field, value)))
}
