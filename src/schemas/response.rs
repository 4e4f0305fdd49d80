//! AggregatedResponse Schema

use serde::{Deserialize, Serialize};

use super::common::SourceId;
use super::search_result::SearchResult;

/// One page of merged results plus the sources that failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResponse {
    pub results: Vec<SearchResult>,
    /// Sum of per-source totals; an upper-bound estimate, not an exact count
    pub total_results: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
    pub failed_sources: Vec<SourceId>,
}

impl AggregatedResponse {
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            results: Vec::new(),
            total_results: 0,
            page,
            page_size,
            has_more: false,
            failed_sources: Vec::new(),
        }
    }
}
