use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StoreResult;
use super::models::{Keyword, ScrapedPost, UpsertOutcome};
use super::posts::SqliteScoutStore;

/// The part of the store a search needs, callable from async code.
#[async_trait]
pub trait PostCache: Send + Sync {
    async fn record_search(&self, keyword: &Keyword, at: DateTime<Utc>) -> StoreResult<()>;
    async fn find_cached(&self, platform: &str, keyword: &Keyword) -> StoreResult<Vec<ScrapedPost>>;
    async fn upsert(&self, post: &ScrapedPost) -> StoreResult<UpsertOutcome>;
    async fn mark_live_fetch(
        &self,
        platform: &str,
        keyword: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn last_live_fetch(
        &self,
        platform: &str,
        keyword: &str,
    ) -> StoreResult<Option<DateTime<Utc>>>;
}

#[async_trait]
impl PostCache for SqliteScoutStore {
    async fn record_search(&self, keyword: &Keyword, at: DateTime<Utc>) -> StoreResult<()> {
        let store = self.clone();
        let keyword = keyword.clone();
        tokio::task::spawn_blocking(move || store.record_search(&keyword, at).map(|_| ())).await?
    }

    async fn find_cached(&self, platform: &str, keyword: &Keyword) -> StoreResult<Vec<ScrapedPost>> {
        let store = self.clone();
        let platform = platform.to_string();
        let keyword = keyword.clone();
        tokio::task::spawn_blocking(move || {
            store.find_cached(&platform, &keyword.text, &keyword.thresholds)
        })
        .await?
    }

    async fn upsert(&self, post: &ScrapedPost) -> StoreResult<UpsertOutcome> {
        let store = self.clone();
        let post = post.clone();
        tokio::task::spawn_blocking(move || store.upsert_post(&post)).await?
    }

    async fn mark_live_fetch(
        &self,
        platform: &str,
        keyword: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let store = self.clone();
        let (platform, keyword) = (platform.to_string(), keyword.to_string());
        tokio::task::spawn_blocking(move || store.mark_live_fetch(&platform, &keyword, at)).await?
    }

    async fn last_live_fetch(
        &self,
        platform: &str,
        keyword: &str,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let store = self.clone();
        let (platform, keyword) = (platform.to_string(), keyword.to_string());
        tokio::task::spawn_blocking(move || store.last_live_fetch(&platform, &keyword)).await?
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::engagement::EngagementMetrics;
    use crate::store::Thresholds;

    #[tokio::test]
    async fn async_facade_round_trips_through_sqlite() {
        let dir = tempdir().unwrap();
        let store = SqliteScoutStore::new(dir.path().join("cache.sqlite")).unwrap();
        store.initialize().unwrap();
        let cache: &dyn PostCache = &store;

        let keyword = Keyword::new("rust", Thresholds::default());
        cache.record_search(&keyword, Utc::now()).await.unwrap();
        let post = ScrapedPost {
            platform: "x".into(),
            external_id: "11".into(),
            text: "hello".into(),
            metrics: EngagementMetrics::default(),
            followers_count: 0,
            keyword: "rust".into(),
            reply: "hi".into(),
            created_at: Utc::now(),
        };
        assert_eq!(cache.upsert(&post).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(cache.upsert(&post).await.unwrap(), UpsertOutcome::Skipped);

        let cached = cache.find_cached("x", &keyword).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].reply, "hi");
        assert_eq!(store.search_history(None, 5).unwrap().len(), 1);

        let fetched = Utc::now();
        cache.mark_live_fetch("x", "rust", fetched).await.unwrap();
        let last = cache.last_live_fetch("x", "rust").await.unwrap().unwrap();
        assert_eq!(last.timestamp(), fetched.timestamp());
    }
}
