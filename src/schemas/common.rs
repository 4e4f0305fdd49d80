//! Common Schema Primitives
//!
//! Source identifiers, provenance and categories shared across schemas

use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 8601 timestamp or date string
pub type Timestamp = String;

// ============================================
// SOURCE IDENTIFIERS
// ============================================

/// Opaque key selecting an adapter and tagging provenance
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub const NEWSAPI: &'static str = "newsapi";
    pub const GOOGLE_NEWS: &'static str = "google-news";
    pub const GOOGLE_FACT_CHECK: &'static str = "google-fact-check";
    pub const TWITTER: &'static str = "twitter";
    pub const DANE_GOV_PL: &'static str = "dane-gov-pl";
    pub const STAT_GOV_POLAND: &'static str = "stat-gov-poland";
    pub const SDG_POLAND: &'static str = "sdg-poland";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<&str> for SourceId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ============================================
// COMMON ENUMS
// ============================================

/// Editorial reliability of a publisher
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    High,
    Medium,
    Low,
    Unknown,
}

/// Group a source belongs to, used by the `sourceCategory` filter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SourceCategory {
    News,
    FactCheck,
    Social,
    Government,
    Dataset,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::News => "news",
            SourceCategory::FactCheck => "fact-check",
            SourceCategory::Social => "social",
            SourceCategory::Government => "government",
            SourceCategory::Dataset => "dataset",
        }
    }

    /// Parses a category name; accepts the frontend's `factCheck` spelling
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "news" => Some(SourceCategory::News),
            "fact-check" | "factcheck" => Some(SourceCategory::FactCheck),
            "social" => Some(SourceCategory::Social),
            "government" => Some(SourceCategory::Government),
            "dataset" => Some(SourceCategory::Dataset),
            _ => None,
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// PROVENANCE
// ============================================

/// Publisher of a single result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reliability: Option<Reliability>,
}

impl SourceInfo {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            icon: None,
            reliability: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = Some(reliability);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_serializes_as_plain_string() {
        let id = SourceId::from(SourceId::DANE_GOV_PL);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"dane-gov-pl\"");
        assert_eq!(id, SourceId::DANE_GOV_PL);
    }

    #[test]
    fn test_source_category_parse() {
        assert_eq!(SourceCategory::parse("factCheck"), Some(SourceCategory::FactCheck));
        assert_eq!(SourceCategory::parse(" Government "), Some(SourceCategory::Government));
        assert_eq!(SourceCategory::parse("all"), None);
        assert_eq!(
            serde_json::to_string(&SourceCategory::FactCheck).unwrap(),
            "\"fact-check\""
        );
    }

    #[test]
    fn test_source_info_skips_absent_fields() {
        let info = SourceInfo::new("DANE.GOV.PL", "https://dane.gov.pl");
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("icon").is_none());
        assert!(json.get("reliability").is_none());
    }
}
