use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::engagement::EngagementMetrics;

/// Minimum engagement a result must reach. Filtering only applies when all
/// three values are non-zero; a single zero disables it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub min_likes: u64,
    pub min_retweets: u64,
    pub min_followers: u64,
}

impl Thresholds {
    pub fn new(min_likes: u64, min_retweets: u64, min_followers: u64) -> Self {
        Self {
            min_likes,
            min_retweets,
            min_followers,
        }
    }

    pub fn is_active(&self) -> bool {
        self.min_likes > 0 && self.min_retweets > 0 && self.min_followers > 0
    }

    pub fn admits(&self, post: &ScrapedPost) -> bool {
        post.metrics.likes >= self.min_likes
            && post.metrics.retweets >= self.min_retweets
            && post.followers_count >= self.min_followers
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    pub thresholds: Thresholds,
    pub account_id: Option<String>,
}

impl Keyword {
    pub fn new(text: impl Into<String>, thresholds: Thresholds) -> Self {
        Self {
            text: text.into(),
            thresholds,
            account_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Cache,
    Live,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Cache => "cache",
            Provenance::Live => "live",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPost {
    pub platform: String,
    pub external_id: String,
    pub text: String,
    pub metrics: EngagementMetrics,
    pub followers_count: u64,
    pub keyword: String,
    pub reply: String,
    /// When the post was fetched, not when it was published.
    pub created_at: DateTime<Utc>,
}

impl ScrapedPost {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: NaiveDateTime = row.get("created_at")?;
        Ok(Self {
            platform: row.get("platform")?,
            external_id: row.get("external_id")?,
            text: row.get("text")?,
            metrics: EngagementMetrics {
                replies: read_count(row, "reply_count")?,
                retweets: read_count(row, "retweet_count")?,
                likes: read_count(row, "like_count")?,
                bookmarks: read_count(row, "bookmark_count")?,
                views: read_count(row, "view_count")?,
            },
            followers_count: read_count(row, "followers_count")?,
            keyword: row.get("keyword")?,
            reply: row.get::<_, Option<String>>("reply")?.unwrap_or_default(),
            created_at: Utc.from_utc_datetime(&created_at),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHistoryEntry {
    pub id: i64,
    pub keyword: String,
    pub thresholds: Thresholds,
    pub account_id: Option<String>,
    pub searched_at: DateTime<Utc>,
}

impl SearchHistoryEntry {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let searched_at: NaiveDateTime = row.get("searched_at")?;
        Ok(Self {
            id: row.get("id")?,
            keyword: row.get("keyword")?,
            thresholds: Thresholds {
                min_likes: read_count(row, "min_likes")?,
                min_retweets: read_count(row, "min_retweets")?,
                min_followers: read_count(row, "min_followers")?,
            },
            account_id: row.get("account_id")?,
            searched_at: Utc.from_utc_datetime(&searched_at),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostHistoryEntry {
    pub id: i64,
    pub account_id: String,
    pub text: String,
    pub url: Option<String>,
    pub keyword: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub retweet_count: u64,
    pub reposted_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PostHistoryEntry {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: NaiveDateTime = row.get("created_at")?;
        let posted_at: Option<NaiveDateTime> = row.get("posted_at")?;
        let reposted_at: Option<NaiveDateTime> = row.get("reposted_at")?;
        let deleted_at: Option<NaiveDateTime> = row.get("deleted_at")?;
        Ok(Self {
            id: row.get("id")?,
            account_id: row.get("account_id")?,
            text: row.get("text")?,
            url: row.get("url")?,
            keyword: row.get("keyword")?,
            posted_at: posted_at.map(|dt| Utc.from_utc_datetime(&dt)),
            created_at: Utc.from_utc_datetime(&created_at),
            like_count: read_count(row, "like_count")?,
            retweet_count: read_count(row, "retweet_count")?,
            reposted_at: reposted_at.map(|dt| Utc.from_utc_datetime(&dt)),
            deleted_at: deleted_at.map(|dt| Utc.from_utc_datetime(&dt)),
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPostHistory {
    pub account_id: String,
    pub text: String,
    pub url: Option<String>,
    pub keyword: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    /// A row with the same `(platform, external_id)` already existed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HistoryDecision {
    Applied { entry: PostHistoryEntry },
    CoolingDown { remaining_seconds: i64 },
    NotFound,
}

fn read_count(row: &Row<'_>, column: &str) -> rusqlite::Result<u64> {
    Ok(row.get::<_, Option<i64>>(column)?.unwrap_or(0).max(0) as u64)
}
