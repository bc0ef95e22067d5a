// src/process/stages.rs
//! Cheap rule-based reduction stages. Both are pure: no I/O, no suspension.

use crate::agents::types::RawResult;

/// Case-insensitive substring match of any keyword against the text.
fn any_keyword_match(text: &str, keywords: &[String]) -> bool {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .any(|kw| haystack.contains(&kw.to_lowercase()))
}

/// Stage 1: title heuristic. With no keywords the overlap cannot be computed
/// and the stage passes everything through; `permissive` forces pass-through.
pub fn filter_by_title(
    items: Vec<RawResult>,
    keywords: &[String],
    permissive: bool,
) -> Vec<RawResult> {
    if permissive || keywords.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| any_keyword_match(&item.title, keywords))
        .collect()
}

/// Stage 2: content keyword filter. Items with empty content pass through
/// unfiltered; missing data is never penalized.
pub fn filter_by_content(items: Vec<RawResult>, keywords: &[String]) -> Vec<RawResult> {
    if keywords.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| item.content.is_empty() || any_keyword_match(&item.content, keywords))
        .collect()
}
