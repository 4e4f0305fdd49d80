//! Paginator

use crate::schemas::SearchResult;

/// One page of merged results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<SearchResult>,
    pub has_more: bool,
}

/// Slices `items` for `page` (1-based) of `page_size`
///
/// `has_more` compares against the estimated `total_results`, not the number
/// of merged items. Out-of-range pages come back empty with `has_more = false`.
pub fn paginate(items: Vec<SearchResult>, page: u32, page_size: u32, total_results: u64) -> Page {
    let start = (page.saturating_sub(1) as usize).saturating_mul(page_size as usize);
    if page == 0 || page_size == 0 || start >= items.len() {
        return Page::default();
    }

    let items: Vec<SearchResult> = items.into_iter().skip(start).take(page_size as usize).collect();
    let has_more = (page as u64).saturating_mul(page_size as u64) < total_results;

    Page { items, has_more }
}
