//! Keyword parsing and normalization.

use std::collections::BTreeSet;

/// Parse free-text, comma-separated input into an ordered tag list.
///
/// Whitespace around each entry is stripped and empty entries are dropped.
/// Case and order are preserved; use [`normalize_keywords`] to build a set.
pub fn parse_keywords(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Normalize a single keyword: trimmed, lowercase, inner whitespace collapsed.
pub fn normalize_keyword(keyword: &str) -> Option<String> {
    let normalized = keyword
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Normalize keywords into a deduplicated set
pub fn normalize_keywords<I, S>(keywords: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .filter_map(|k| normalize_keyword(k.as_ref()))
        .collect()
}
