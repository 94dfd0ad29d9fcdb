use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub replies: u64,
    pub retweets: u64,
    pub likes: u64,
    pub bookmarks: u64,
    pub views: u64,
}

/// Turns the aggregated engagement label rendered under a post into counts.
pub trait MetricsExtractor: Send + Sync {
    fn parse(&self, label: &str) -> EngagementMetrics;
}

/// Matches `<number> <unit>` pairs anywhere in the label. Each metric has its
/// own pattern, so field order and surrounding words do not matter.
#[derive(Debug, Clone)]
pub struct LabelPatternParser {
    replies: Regex,
    retweets: Regex,
    likes: Regex,
    bookmarks: Regex,
    views: Regex,
}

const NUMBER: &str = r"(\d[\d,]*(?:\.\d+)?)\s*([KkMmBb])?";

fn unit_pattern(unit: &str) -> Regex {
    let pattern = format!(r"(?i){NUMBER}\s+{unit}\b");
    Regex::new(&pattern).unwrap_or_else(|err| panic!("invalid metrics pattern {pattern}: {err}"))
}

impl Default for LabelPatternParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelPatternParser {
    pub fn new() -> Self {
        Self {
            replies: unit_pattern("(?:repl(?:y|ies))"),
            retweets: unit_pattern("(?:reposts?|retweets?)"),
            likes: unit_pattern("likes?"),
            bookmarks: unit_pattern("bookmarks?"),
            views: unit_pattern("views?"),
        }
    }

    fn extract(pattern: &Regex, label: &str) -> u64 {
        pattern
            .captures(label)
            .and_then(|caps| {
                let digits = caps.get(1)?.as_str();
                let suffix = caps.get(2).map(|m| m.as_str());
                expand_count(digits, suffix)
            })
            .unwrap_or(0)
    }
}

impl MetricsExtractor for LabelPatternParser {
    fn parse(&self, label: &str) -> EngagementMetrics {
        EngagementMetrics {
            replies: Self::extract(&self.replies, label),
            retweets: Self::extract(&self.retweets, label),
            likes: Self::extract(&self.likes, label),
            bookmarks: Self::extract(&self.bookmarks, label),
            views: Self::extract(&self.views, label),
        }
    }
}

fn expand_count(digits: &str, suffix: Option<&str>) -> Option<u64> {
    let cleaned = digits.replace(',', "");
    let multiplier = match suffix.map(|s| s.to_ascii_lowercase()) {
        Some(ref s) if s == "k" => 1_000.0,
        Some(ref s) if s == "m" => 1_000_000.0,
        Some(ref s) if s == "b" => 1_000_000_000.0,
        _ => 1.0,
    };
    if multiplier == 1.0 && !cleaned.contains('.') {
        return cleaned.parse::<u64>().ok();
    }
    let value = cleaned.parse::<f64>().ok()?;
    Some((value * multiplier).round() as u64)
}
