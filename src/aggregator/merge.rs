//! Result Merger
//!
//! Concatenates per-source results in source-priority order, tags their
//! provenance and applies the global sort.

use std::collections::HashSet;

use crate::retry::SourceOutcome;
use crate::schemas::{SearchResult, SortBy, SortOrder};

/// Merged results of every source, before pagination
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedResults {
    pub items: Vec<SearchResult>,
    /// Sum of per-source totals
    pub total_results: u64,
}

/// Merges outcomes that are already in priority order
pub fn merge(outcomes: Vec<SourceOutcome>, sort_by: SortBy, sort_order: SortOrder) -> MergedResults {
    let mut total_results: u64 = 0;
    let mut items = Vec::with_capacity(outcomes.iter().map(|o| o.results.len()).sum());

    for outcome in outcomes {
        total_results = total_results.saturating_add(outcome.total_results);
        let source = outcome.source;
        items.extend(outcome.results.into_iter().map(|mut item| {
            if item.source_id.is_none() {
                item.source_id = Some(source.clone());
            }
            item
        }));
    }

    ensure_unique_ids(&mut items);

    if sort_by == SortBy::Date {
        items = sort_by_date(items, sort_order);
    }

    MergedResults {
        items,
        total_results,
    }
}

/// Stable sort on the parsed date; missing or unparseable dates count as epoch zero
pub fn sort_by_date(items: Vec<SearchResult>, order: SortOrder) -> Vec<SearchResult> {
    let mut keyed: Vec<(i64, SearchResult)> = items
        .into_iter()
        .map(|item| {
            let key = item.parsed_date().map(|d| d.timestamp_millis()).unwrap_or(0);
            (key, item)
        })
        .collect();

    match order {
        SortOrder::Asc => keyed.sort_by(|a, b| a.0.cmp(&b.0)),
        SortOrder::Desc => keyed.sort_by(|a, b| b.0.cmp(&a.0)),
    }

    keyed.into_iter().map(|(_, item)| item).collect()
}

/// Suffixes repeated ids so every id in a response is distinct
fn ensure_unique_ids(items: &mut [SearchResult]) {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    for item in items.iter_mut() {
        if seen.insert(item.id.clone()) {
            continue;
        }
        let mut n = 2;
        let mut candidate = format!("{}-{}", item.id, n);
        while seen.contains(&candidate) {
            n += 1;
            candidate = format!("{}-{}", item.id, n);
        }
        seen.insert(candidate.clone());
        item.id = candidate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::retry::Resolution;
    use crate::schemas::{NewsDetails, ResultDetails, SourceId, SourceInfo};
    use crate::sources::SourcePage;

    fn item(id: &str, date: Option<&str>) -> SearchResult {
        SearchResult::new(
            id,
            id,
            format!("https://example.com/{}", id),
            SourceInfo::new("Example", "https://example.com"),
            ResultDetails::News(NewsDetails::default()),
        )
        .with_date(date.map(str::to_string))
    }

    fn outcome(source: &str, items: Vec<SearchResult>, total: u64) -> SourceOutcome {
        SourceOutcome::succeeded(
            SourceId::from(source),
            SourcePage::new(items, Some(total)),
            Resolution::Primary { attempts: 1 },
        )
    }

    fn ids(items: &[SearchResult]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_concatenates_in_priority_order_and_sums_totals() {
        let merged = merge(
            vec![
                outcome("newsapi", vec![item("a", None), item("b", None)], 120),
                SourceOutcome::failed(SourceId::from("twitter"), AdapterError::RateLimited("429".into())),
                outcome("sdg-poland", vec![item("c", None)], 1),
            ],
            SortBy::Relevance,
            SortOrder::Desc,
        );

        assert_eq!(ids(&merged.items), vec!["a", "b", "c"]);
        assert_eq!(merged.total_results, 121);
        assert_eq!(merged.items[2].source_id, Some(SourceId::from("sdg-poland")));
    }

    #[test]
    fn test_keeps_existing_source_id() {
        let tagged = item("a", None).with_source_id(SourceId::from("google-news"));
        let merged = merge(
            vec![outcome("newsapi", vec![tagged], 1)],
            SortBy::Relevance,
            SortOrder::Desc,
        );
        assert_eq!(merged.items[0].source_id, Some(SourceId::from("google-news")));
    }

    #[test]
    fn test_date_sort_missing_dates() {
        let items = vec![item("none", None), item("new", Some("2024-01-01")), item("old", Some("2023-01-01"))];

        let desc = sort_by_date(items.clone(), SortOrder::Desc);
        assert_eq!(ids(&desc), vec!["new", "old", "none"]);

        let asc = sort_by_date(items, SortOrder::Asc);
        assert_eq!(ids(&asc), vec!["none", "old", "new"]);
    }

    #[test]
    fn test_date_sort_is_stable() {
        let items = vec![
            item("a", Some("2024-03-01T10:00:00Z")),
            item("b", Some("not a date")),
            item("c", Some("2024-03-01")),
            item("d", Some("2024-03-01T10:00:00+00:00")),
            item("e", None),
        ];

        let desc = sort_by_date(items, SortOrder::Desc);
        assert_eq!(ids(&desc), vec!["a", "d", "c", "b", "e"]);
    }

    #[test]
    fn test_relevance_keeps_merged_order() {
        let merged = merge(
            vec![outcome(
                "newsapi",
                vec![item("x", Some("2020-01-01")), item("y", Some("2024-01-01"))],
                2,
            )],
            SortBy::Popularity,
            SortOrder::Asc,
        );
        assert_eq!(ids(&merged.items), vec!["x", "y"]);
    }

    #[test]
    fn test_repeated_ids_are_suffixed() {
        let merged = merge(
            vec![
                outcome("newsapi", vec![item("dup", None), item("dup", None)], 2),
                outcome("google-news", vec![item("dup", None)], 1),
            ],
            SortBy::Relevance,
            SortOrder::Desc,
        );
        assert_eq!(ids(&merged.items), vec!["dup", "dup-2", "dup-3"]);
    }
}
