use std::collections::HashSet;

use crate::store::{ScrapedPost, Thresholds};

/// Splits a comma-separated keyword list. Entries are trimmed, blanks and
/// exact repeats are dropped, first-seen order is kept.
pub fn split_keywords(csv: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    csv.split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .filter(|keyword| seen.insert(keyword.to_string()))
        .map(str::to_string)
        .collect()
}

/// Keeps posts reaching every threshold, but only when all three thresholds
/// are non-zero. Otherwise the candidates pass through untouched.
pub fn apply_threshold_filter(posts: Vec<ScrapedPost>, thresholds: &Thresholds) -> Vec<ScrapedPost> {
    if !thresholds.is_active() {
        return posts;
    }
    posts
        .into_iter()
        .filter(|post| thresholds.admits(post))
        .collect()
}
