use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::info;

use crate::cooldown::{can_repost, repost_cooldown};

use super::error::{StoreError, StoreResult};
use super::models::{HistoryDecision, NewPostHistory, PostHistoryEntry};
use super::posts::{to_sql_count, SqliteScoutStore};

/// `?1` is the entry id, `?3` the cooldown cutoff.
const GATE: &str = "id = ?1 AND deleted_at IS NULL AND created_at <= ?3";

const HISTORY_COLUMNS: &str = "id, account_id, text, url, keyword, posted_at, created_at, \
     like_count, retweet_count, reposted_at, deleted_at";

impl SqliteScoutStore {
    pub fn record_post(&self, new: &NewPostHistory, now: DateTime<Utc>) -> StoreResult<PostHistoryEntry> {
        let id = {
            let conn = self.open()?;
            conn.execute(
                "INSERT INTO post_history (account_id, text, url, keyword, posted_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    &new.account_id,
                    &new.text,
                    &new.url,
                    &new.keyword,
                    new.posted_at.map(|dt| dt.naive_utc()),
                    now.naive_utc(),
                ],
            )?;
            conn.last_insert_rowid()
        };
        info!(id, account = %new.account_id, "recorded post history entry");
        self.fetch_history(id)?
            .ok_or(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn fetch_history(&self, id: i64) -> StoreResult<Option<PostHistoryEntry>> {
        let conn = self.open()?;
        let entry = conn
            .query_row(
                &format!("SELECT {HISTORY_COLUMNS} FROM post_history WHERE id = ?1"),
                params![id],
                PostHistoryEntry::from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn list_history(
        &self,
        account_id: Option<&str>,
        include_deleted: bool,
        limit: usize,
    ) -> StoreResult<Vec<PostHistoryEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS}
             FROM post_history
             WHERE (?1 IS NULL OR account_id = ?1)
               AND (?2 = 1 OR deleted_at IS NULL)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![account_id, include_deleted as i64, limit as i64],
            PostHistoryEntry::from_row,
        )?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn soft_delete(&self, id: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE post_history SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now.naive_utc()],
        )?;
        Ok(changed > 0)
    }

    /// Reposts the entry when its cooldown has elapsed. A successful repost
    /// restarts the cooldown.
    pub fn repost(&self, id: i64, now: DateTime<Utc>) -> StoreResult<HistoryDecision> {
        self.gated(id, now, |conn, cutoff| {
            conn.execute(
                &format!(
                    "UPDATE post_history SET reposted_at = ?2, created_at = ?2 WHERE {GATE}"
                ),
                params![id, now.naive_utc(), cutoff],
            )
        })
    }

    pub fn refresh_engagement(
        &self,
        id: i64,
        likes: u64,
        retweets: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<HistoryDecision> {
        self.gated(id, now, |conn, cutoff| {
            conn.execute(
                &format!(
                    "UPDATE post_history
                     SET like_count = ?2, retweet_count = ?4, created_at = ?5
                     WHERE {GATE}"
                ),
                params![
                    id,
                    to_sql_count(likes),
                    cutoff,
                    to_sql_count(retweets),
                    now.naive_utc()
                ],
            )
        })
    }

    /// `apply` runs one UPDATE filtered by [`GATE`], so the cooldown check
    /// and the write are a single statement. Zero changed rows means the
    /// entry is missing, deleted, or still cooling down.
    fn gated<F>(&self, id: i64, now: DateTime<Utc>, apply: F) -> StoreResult<HistoryDecision>
    where
        F: FnOnce(&rusqlite::Connection, NaiveDateTime) -> rusqlite::Result<usize>,
    {
        let cutoff = (now - repost_cooldown()).naive_utc();
        let changed = {
            let conn = self.open()?;
            apply(&conn, cutoff)?
        };
        let entry = match self.fetch_history(id)? {
            Some(entry) if !entry.is_deleted() => entry,
            _ => return Ok(HistoryDecision::NotFound),
        };
        if changed > 0 {
            return Ok(HistoryDecision::Applied { entry });
        }
        let remaining = can_repost(entry.created_at, now)
            .remaining
            .map(|left| left.num_seconds())
            .unwrap_or(0);
        Ok(HistoryDecision::CoolingDown {
            remaining_seconds: remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;

    fn store() -> (tempfile::TempDir, SqliteScoutStore) {
        let dir = tempdir().unwrap();
        let store = SqliteScoutStore::new(dir.path().join("scout.sqlite")).unwrap();
        store.initialize().unwrap();
        (dir, store)
    }

    fn new_post(account: &str) -> NewPostHistory {
        NewPostHistory {
            account_id: account.into(),
            text: "shipping a new release".into(),
            url: Some("https://x.com/acct/status/1".into()),
            keyword: Some("rust".into()),
            posted_at: None,
        }
    }

    #[test]
    fn repost_waits_for_cooldown() {
        let (_dir, store) = store();
        let start = Utc::now();
        let entry = store.record_post(&new_post("acct"), start).unwrap();

        let early = store.repost(entry.id, start + Duration::minutes(90)).unwrap();
        assert_eq!(
            early,
            HistoryDecision::CoolingDown {
                remaining_seconds: 30 * 60
            }
        );

        let later = start + Duration::minutes(120);
        match store.repost(entry.id, later).unwrap() {
            HistoryDecision::Applied { entry } => {
                assert!(entry.reposted_at.is_some());
                assert_eq!(entry.created_at.timestamp(), later.timestamp());
            }
            other => panic!("unexpected decision {other:?}"),
        }

        // The repost restarted the window.
        assert!(matches!(
            store.repost(entry.id, later + Duration::minutes(5)).unwrap(),
            HistoryDecision::CoolingDown { .. }
        ));
    }

    #[test]
    fn refresh_updates_counts_after_cooldown() {
        let (_dir, store) = store();
        let start = Utc::now();
        let entry = store.record_post(&new_post("acct"), start).unwrap();

        let decision = store
            .refresh_engagement(entry.id, 40, 7, start + Duration::hours(3))
            .unwrap();
        match decision {
            HistoryDecision::Applied { entry } => {
                assert_eq!(entry.like_count, 40);
                assert_eq!(entry.retweet_count, 7);
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn deleted_entries_are_hidden_and_not_actionable() {
        let (_dir, store) = store();
        let start = Utc::now();
        let kept = store.record_post(&new_post("acct"), start).unwrap();
        let gone = store.record_post(&new_post("acct"), start).unwrap();
        store.record_post(&new_post("other"), start).unwrap();

        assert!(store.soft_delete(gone.id, start).unwrap());
        assert!(!store.soft_delete(gone.id, start).unwrap());

        let visible = store.list_history(Some("acct"), false, 10).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, kept.id);
        assert_eq!(store.list_history(Some("acct"), true, 10).unwrap().len(), 2);
        assert_eq!(store.list_history(None, false, 10).unwrap().len(), 2);

        assert_eq!(
            store.repost(gone.id, start + Duration::hours(3)).unwrap(),
            HistoryDecision::NotFound
        );
        assert_eq!(
            store.repost(9999, start).unwrap(),
            HistoryDecision::NotFound
        );
    }

    #[test]
    fn concurrent_reposts_apply_once() {
        let (_dir, store) = store();
        let start = Utc::now();
        let entry = store.record_post(&new_post("acct"), start).unwrap();
        let at = start + Duration::hours(3);

        let barrier = std::sync::Arc::new(std::sync::Barrier::new(4));
        let workers = (0..4)
            .map(|_| {
                let store = store.clone();
                let barrier = std::sync::Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.repost(entry.id, at).unwrap()
                })
            })
            .collect::<Vec<_>>();
        let decisions = workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect::<Vec<_>>();

        let applied = decisions
            .iter()
            .filter(|decision| matches!(decision, HistoryDecision::Applied { .. }))
            .count();
        assert_eq!(applied, 1, "{decisions:?}");
        assert!(decisions.iter().all(|decision| matches!(
            decision,
            HistoryDecision::Applied { .. } | HistoryDecision::CoolingDown { .. }
        )));
    }

    #[test]
    fn cooling_down_refresh_leaves_counts_untouched() {
        let (_dir, store) = store();
        let start = Utc::now();
        let entry = store.record_post(&new_post("acct"), start).unwrap();

        let decision = store
            .refresh_engagement(entry.id, 40, 7, start + Duration::minutes(119))
            .unwrap();
        assert_eq!(
            decision,
            HistoryDecision::CoolingDown {
                remaining_seconds: 60
            }
        );
        let stored = store.fetch_history(entry.id).unwrap().unwrap();
        assert_eq!(stored.like_count, 0);
        assert_eq!(stored.created_at.timestamp(), start.timestamp());
    }
}
