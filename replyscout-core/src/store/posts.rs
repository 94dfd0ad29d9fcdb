use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::sqlite::configure_connection;

use super::error::{StoreError, StoreResult};
use super::models::{Keyword, ScrapedPost, SearchHistoryEntry, Thresholds, UpsertOutcome};

const SCOUT_SCHEMA: &str = include_str!("../../../sql/scout.sql");

pub(super) const POST_COLUMNS: &str = "platform, external_id, text, reply_count, retweet_count, \
     like_count, bookmark_count, view_count, followers_count, keyword, reply, created_at";

#[derive(Debug, Clone)]
pub struct SqliteScoutStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteScoutStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteScoutStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> StoreResult<SqliteScoutStore> {
        let path = self.path.ok_or(StoreError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteScoutStore { path, flags })
    }
}

/// Scraped posts, search history and post history in one SQLite file. Every
/// call opens its own connection, so the store is cheap to clone across tasks.
#[derive(Debug, Clone)]
pub struct SqliteScoutStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteScoutStore {
    pub fn builder() -> SqliteScoutStoreBuilder {
        SqliteScoutStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        SqliteScoutStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn open(&self) -> StoreResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !self.flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY) {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            StoreError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| StoreError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute_batch(SCOUT_SCHEMA)?;
        Ok(())
    }

    pub fn record_search(&self, keyword: &Keyword, at: DateTime<Utc>) -> StoreResult<i64> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO search_history (
                keyword, min_likes, min_retweets, min_followers, account_id, searched_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &keyword.text,
                to_sql_count(keyword.thresholds.min_likes),
                to_sql_count(keyword.thresholds.min_retweets),
                to_sql_count(keyword.thresholds.min_followers),
                &keyword.account_id,
                at.naive_utc(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn search_history(
        &self,
        keyword: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<SearchHistoryEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, keyword, min_likes, min_retweets, min_followers, account_id, searched_at
             FROM search_history
             WHERE (?1 IS NULL OR keyword = ?1)
             ORDER BY searched_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![keyword, limit as i64], SearchHistoryEntry::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn mark_live_fetch(
        &self,
        platform: &str,
        keyword: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO keyword_fetches (platform, keyword, fetched_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(platform, keyword) DO UPDATE SET fetched_at = excluded.fetched_at",
            params![platform, keyword, at.naive_utc()],
        )?;
        Ok(())
    }

    pub fn last_live_fetch(
        &self,
        platform: &str,
        keyword: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let conn = self.open()?;
        let fetched_at: Option<NaiveDateTime> = conn
            .query_row(
                "SELECT fetched_at FROM keyword_fetches WHERE platform = ?1 AND keyword = ?2",
                params![platform, keyword],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fetched_at.map(|at| Utc.from_utc_datetime(&at)))
    }

    /// Cached posts for `keyword` on `platform` that reach every threshold,
    /// newest fetch first.
    pub fn find_cached(
        &self,
        platform: &str,
        keyword: &str,
        thresholds: &Thresholds,
    ) -> StoreResult<Vec<ScrapedPost>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS}
             FROM scraped_posts
             WHERE platform = ?1
               AND keyword = ?2
               AND like_count >= ?3
               AND retweet_count >= ?4
               AND followers_count >= ?5
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(
            params![
                platform,
                keyword,
                to_sql_count(thresholds.min_likes),
                to_sql_count(thresholds.min_retweets),
                to_sql_count(thresholds.min_followers),
            ],
            ScrapedPost::from_row,
        )?;
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }

    /// Inserts the post unless `(platform, external_id)` is already stored.
    /// An existing row is never modified.
    pub fn upsert_post(&self, post: &ScrapedPost) -> StoreResult<UpsertOutcome> {
        let conn = self.open()?;
        let changed = conn.execute(
            &format!(
                "INSERT INTO scraped_posts ({POST_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(platform, external_id) DO NOTHING"
            ),
            params![
                &post.platform,
                &post.external_id,
                &post.text,
                to_sql_count(post.metrics.replies),
                to_sql_count(post.metrics.retweets),
                to_sql_count(post.metrics.likes),
                to_sql_count(post.metrics.bookmarks),
                to_sql_count(post.metrics.views),
                to_sql_count(post.followers_count),
                &post.keyword,
                &post.reply,
                post.created_at.naive_utc(),
            ],
        )?;
        if changed == 0 {
            debug!(external_id = %post.external_id, "post already cached");
            Ok(UpsertOutcome::Skipped)
        } else {
            Ok(UpsertOutcome::Inserted)
        }
    }

    pub fn fetch_post(&self, platform: &str, external_id: &str) -> StoreResult<Option<ScrapedPost>> {
        let conn = self.open()?;
        let post = conn
            .query_row(
                &format!(
                    "SELECT {POST_COLUMNS} FROM scraped_posts
                     WHERE platform = ?1 AND external_id = ?2"
                ),
                params![platform, external_id],
                ScrapedPost::from_row,
            )
            .optional()?;
        Ok(post)
    }

    pub fn list_posts(
        &self,
        platform: &str,
        keyword: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<ScrapedPost>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS}
             FROM scraped_posts
             WHERE platform = ?1 AND (?2 IS NULL OR keyword = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![platform, keyword, limit as i64], ScrapedPost::from_row)?;
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }

    pub fn delete_post(&self, platform: &str, external_id: &str) -> StoreResult<bool> {
        let conn = self.open()?;
        let removed = conn.execute(
            "DELETE FROM scraped_posts WHERE platform = ?1 AND external_id = ?2",
            params![platform, external_id],
        )?;
        Ok(removed > 0)
    }

    pub fn update_reply(
        &self,
        platform: &str,
        external_id: &str,
        reply: &str,
    ) -> StoreResult<Option<ScrapedPost>> {
        let changed = {
            let conn = self.open()?;
            conn.execute(
                "UPDATE scraped_posts SET reply = ?3 WHERE platform = ?1 AND external_id = ?2",
                params![platform, external_id, reply],
            )?
        };
        if changed == 0 {
            return Ok(None);
        }
        self.fetch_post(platform, external_id)
    }
}

pub(super) fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;
    use crate::engagement::EngagementMetrics;

    fn store() -> (tempfile::TempDir, SqliteScoutStore) {
        let dir = tempdir().unwrap();
        let store = SqliteScoutStore::new(dir.path().join("scout.sqlite")).unwrap();
        store.initialize().unwrap();
        (dir, store)
    }

    fn post(id: &str, keyword: &str, likes: u64, at: DateTime<Utc>) -> ScrapedPost {
        ScrapedPost {
            platform: "x".into(),
            external_id: id.into(),
            text: format!("post {id}"),
            metrics: EngagementMetrics {
                likes,
                retweets: likes / 2,
                ..EngagementMetrics::default()
            },
            followers_count: 0,
            keyword: keyword.into(),
            reply: String::new(),
            created_at: at,
        }
    }

    #[test]
    fn builder_requires_path() {
        assert!(matches!(
            SqliteScoutStore::builder().build(),
            Err(StoreError::MissingStore)
        ));
    }

    #[test]
    fn upsert_keeps_first_version() {
        let (_dir, store) = store();
        let now = Utc::now();
        let original = post("1", "rust", 10, now);
        assert_eq!(store.upsert_post(&original).unwrap(), UpsertOutcome::Inserted);

        let mut changed = original.clone();
        changed.text = "edited".into();
        changed.metrics.likes = 999;
        assert_eq!(store.upsert_post(&changed).unwrap(), UpsertOutcome::Skipped);

        let stored = store.fetch_post("x", "1").unwrap().unwrap();
        assert_eq!(stored.text, "post 1");
        assert_eq!(stored.metrics.likes, 10);
    }

    #[test]
    fn same_id_on_other_platform_is_distinct() {
        let (_dir, store) = store();
        let now = Utc::now();
        let mut other = post("1", "rust", 1, now);
        other.platform = "bsky".into();
        store.upsert_post(&post("1", "rust", 1, now)).unwrap();
        assert_eq!(store.upsert_post(&other).unwrap(), UpsertOutcome::Inserted);
    }

    #[test]
    fn cache_lookup_applies_thresholds_newest_first() {
        let (_dir, store) = store();
        let now = Utc::now();
        store.upsert_post(&post("1", "rust", 5, now - Duration::minutes(30))).unwrap();
        store.upsert_post(&post("2", "rust", 50, now - Duration::minutes(10))).unwrap();
        store.upsert_post(&post("3", "rust", 80, now - Duration::minutes(20))).unwrap();
        store.upsert_post(&post("4", "go", 80, now)).unwrap();

        let all = store.find_cached("x", "rust", &Thresholds::default()).unwrap();
        let ids = all.iter().map(|p| p.external_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["2", "3", "1"]);

        let popular = store
            .find_cached("x", "rust", &Thresholds::new(40, 0, 0))
            .unwrap();
        let ids = popular.iter().map(|p| p.external_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["2", "3"]);

        assert!(store
            .find_cached("x", "rust", &Thresholds::new(0, 0, 1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn delete_and_update_report_missing_rows() {
        let (_dir, store) = store();
        store.upsert_post(&post("7", "rust", 1, Utc::now())).unwrap();

        let updated = store.update_reply("x", "7", "nice post").unwrap().unwrap();
        assert_eq!(updated.reply, "nice post");
        assert!(store.update_reply("x", "8", "nope").unwrap().is_none());

        assert!(store.delete_post("x", "7").unwrap());
        assert!(!store.delete_post("x", "7").unwrap());
        assert!(store.fetch_post("x", "7").unwrap().is_none());
    }

    #[test]
    fn live_fetch_marks_overwrite_per_keyword() {
        let (_dir, store) = store();
        let now = Utc::now();
        assert!(store.last_live_fetch("x", "rust").unwrap().is_none());

        store.mark_live_fetch("x", "rust", now - Duration::hours(4)).unwrap();
        store.mark_live_fetch("x", "rust", now).unwrap();
        store.mark_live_fetch("x", "go", now - Duration::hours(1)).unwrap();

        let rust = store.last_live_fetch("x", "rust").unwrap().unwrap();
        assert_eq!(rust.timestamp(), now.timestamp());
        let go = store.last_live_fetch("x", "go").unwrap().unwrap();
        assert_eq!(go.timestamp(), (now - Duration::hours(1)).timestamp());
        assert!(store.last_live_fetch("y", "rust").unwrap().is_none());
    }

    #[test]
    fn records_search_history() {
        let (_dir, store) = store();
        let now = Utc::now();
        let mut keyword = Keyword::new("rust", Thresholds::new(1, 2, 3));
        keyword.account_id = Some("acct".into());
        store.record_search(&keyword, now - Duration::minutes(1)).unwrap();
        store.record_search(&Keyword::new("go", Thresholds::default()), now).unwrap();

        let all = store.search_history(None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].keyword, "go");

        let rust = store.search_history(Some("rust"), 10).unwrap();
        assert_eq!(rust.len(), 1);
        assert_eq!(rust[0].thresholds, Thresholds::new(1, 2, 3));
        assert_eq!(rust[0].account_id.as_deref(), Some("acct"));
    }
}
