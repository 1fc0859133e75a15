use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::config::ServiceId;

/// Number of content characters that take part in the deduplication key.
pub const DEDUP_CONTENT_PREFIX: usize = 100;

/// A single search hit in the shape shared by every backend.
///
/// Ids are unique per call only; the same remote item found twice gets two
/// ids, so deduplication goes by content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source: ServiceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl SearchResult {
    fn dedup_key(&self) -> (ServiceId, &str, String) {
        (
            self.source,
            self.title.as_str(),
            self.content.chars().take(DEDUP_CONTENT_PREFIX).collect(),
        )
    }
}

/// Drop results whose (source, title, content prefix) was already seen.
/// The first occurrence wins and relative order is preserved.
pub fn deduplicate(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|result| {
            let (source, title, prefix) = result.dedup_key();
            seen.insert((source, title.to_string(), prefix))
        })
        .collect()
}

/// Newest first; undated results after dated ones. Ties fall back to the
/// position of the source in `precedence`, then to the title.
pub fn sort_results(results: &mut [SearchResult], precedence: &[ServiceId]) {
    let rank = |service: ServiceId| {
        precedence
            .iter()
            .position(|candidate| *candidate == service)
            .unwrap_or(precedence.len())
    };

    results.sort_by(|a, b| {
        compare_recency(a.last_modified, b.last_modified)
            .then_with(|| rank(a.source).cmp(&rank(b.source)))
            .then_with(|| a.title.cmp(&b.title))
    });
}

fn compare_recency(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn result(source: ServiceId, title: &str, content: &str) -> SearchResult {
        SearchResult {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            source,
            url: None,
            last_modified: None,
        }
    }

    fn dated(mut result: SearchResult, day: u32) -> SearchResult {
        result.last_modified = Some(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap());
        result
    }

    #[test]
    fn deduplicate_keeps_first_occurrence() {
        let results = vec![
            result(ServiceId::Notion, "a", "same"),
            result(ServiceId::Atlassian, "a", "same"),
            result(ServiceId::Notion, "a", "same"),
            result(ServiceId::Notion, "b", "same"),
        ];
        let first_id = results[0].id.clone();

        let deduped = deduplicate(results);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0].id, first_id);
        assert_eq!(deduped[1].source, ServiceId::Atlassian);
        assert_eq!(deduped[2].title, "b");
    }

    #[test]
    fn deduplicate_only_compares_content_prefix() {
        let prefix = "x".repeat(DEDUP_CONTENT_PREFIX);
        let results = vec![
            result(ServiceId::Notion, "t", &format!("{prefix}tail one")),
            result(ServiceId::Notion, "t", &format!("{prefix}tail two")),
        ];
        assert_eq!(deduplicate(results).len(), 1);
    }

    #[test]
    fn deduplicate_is_idempotent() {
        let results = vec![
            result(ServiceId::Notion, "a", "1"),
            result(ServiceId::Notion, "a", "1"),
            result(ServiceId::Atlassian, "b", "2"),
        ];
        let once = deduplicate(results);
        let twice = deduplicate(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn dated_results_precede_undated_ones() {
        let mut results = vec![
            result(ServiceId::Notion, "undated", ""),
            dated(result(ServiceId::Atlassian, "old", ""), 1),
            result(ServiceId::Atlassian, "undated too", ""),
            dated(result(ServiceId::Notion, "new", ""), 9),
        ];
        sort_results(&mut results, &ServiceId::all());

        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "old", "undated", "undated too"]);
    }

    #[rstest]
    #[case(vec![ServiceId::Notion, ServiceId::Atlassian], vec!["n", "a"])]
    #[case(vec![ServiceId::Atlassian, ServiceId::Notion], vec!["a", "n"])]
    fn ties_follow_configured_precedence(
        #[case] precedence: Vec<ServiceId>,
        #[case] expected: Vec<&str>,
    ) {
        let mut results = vec![
            dated(result(ServiceId::Atlassian, "a", ""), 3),
            dated(result(ServiceId::Notion, "n", ""), 3),
        ];
        sort_results(&mut results, &precedence);

        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, expected);
    }

    #[test]
    fn final_tie_break_is_title() {
        let mut results = vec![
            result(ServiceId::Notion, "zeta", ""),
            result(ServiceId::Notion, "alpha", ""),
        ];
        sort_results(&mut results, &ServiceId::all());
        assert_eq!(results[0].title, "alpha");
    }
}
