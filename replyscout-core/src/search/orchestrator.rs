use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::browser::{BrowserError, BrowserSession, FeedScraper, SessionProvider};
use crate::config::ScoutConfig;
use crate::cooldown::can_repost;
use crate::engagement::MetricsExtractor;
use crate::reply::ReplyDrafter;
use crate::store::{Keyword, PostCache, Provenance, ScrapedPost, Thresholds, UpsertOutcome};

use super::error::{SearchError, SearchResult};
use super::filter::{apply_threshold_filter, split_keywords};

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub platform: String,
    pub keyword_delay_ms: u64,
    pub default_max_results: usize,
    /// Treat a cache hit as stale once the keyword's last live fetch has
    /// cleared the repost cooldown.
    pub refetch_after_cooldown: bool,
}

impl SearchSettings {
    pub fn from_config(config: &ScoutConfig) -> Self {
        Self {
            platform: config.search.platform.clone(),
            keyword_delay_ms: config.search.keyword_delay_ms,
            default_max_results: config.search.default_max_results,
            refetch_after_cooldown: config.search.refetch_after_cooldown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub keywords: String,
    pub thresholds: Thresholds,
    pub max_results: Option<usize>,
    pub account_id: Option<String>,
}

impl SearchRequest {
    pub fn new(keywords: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            thresholds: Thresholds::default(),
            max_results: None,
            account_id: None,
        }
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub keywords: Vec<String>,
    /// Provenance of the last keyword processed.
    pub from: Provenance,
    pub sources: BTreeMap<String, Provenance>,
    pub count: usize,
    pub results: Vec<ScrapedPost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostView {
    pub id: String,
    pub text: String,
    pub reply: String,
    pub like_count: u64,
    pub retweet_count: u64,
    pub followers_count: u64,
    pub reply_count: u64,
    pub bookmark_count: u64,
    pub view_count: u64,
    pub keyword: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ScrapedPost> for PostView {
    fn from(post: &ScrapedPost) -> Self {
        Self {
            id: post.external_id.clone(),
            text: post.text.clone(),
            reply: post.reply.clone(),
            like_count: post.metrics.likes,
            retweet_count: post.metrics.retweets,
            followers_count: post.followers_count,
            reply_count: post.metrics.replies,
            bookmark_count: post.metrics.bookmarks,
            view_count: post.metrics.views,
            keyword: post.keyword.clone(),
            created_at: post.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub keywords: Vec<String>,
    pub from: Provenance,
    pub count: usize,
    pub tweets: Vec<PostView>,
    pub sources: BTreeMap<String, Provenance>,
}

impl From<&SearchOutcome> for SearchResponse {
    fn from(outcome: &SearchOutcome) -> Self {
        Self {
            keywords: outcome.keywords.clone(),
            from: outcome.from,
            count: outcome.count,
            tweets: outcome.results.iter().map(PostView::from).collect(),
            sources: outcome.sources.clone(),
        }
    }
}

/// Runs keyword jobs one after another: cache first, live scrape on a miss.
pub struct SearchOrchestrator {
    sessions: Arc<dyn SessionProvider>,
    scraper: FeedScraper,
    metrics: Arc<dyn MetricsExtractor>,
    drafter: Arc<dyn ReplyDrafter>,
    cache: Arc<dyn PostCache>,
    settings: SearchSettings,
}

impl SearchOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        scraper: FeedScraper,
        metrics: Arc<dyn MetricsExtractor>,
        drafter: Arc<dyn ReplyDrafter>,
        cache: Arc<dyn PostCache>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            sessions,
            scraper,
            metrics,
            drafter,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub async fn search(&self, request: &SearchRequest) -> SearchResult<SearchOutcome> {
        let keywords = split_keywords(&request.keywords);
        if keywords.is_empty() {
            return Err(SearchError::InvalidRequest(
                "at least one keyword is required".to_string(),
            ));
        }
        let max_results = request
            .max_results
            .unwrap_or(self.settings.default_max_results);

        let mut session = None;
        let result = self
            .run_jobs(keywords, request, max_results, &mut session)
            .await;
        if let Some(session) = session {
            if let Err(err) = session.release().await {
                warn!(error = %err, "failed to release browser session");
            }
        }
        result
    }

    async fn run_jobs(
        &self,
        keywords: Vec<String>,
        request: &SearchRequest,
        max_results: usize,
        session: &mut Option<Box<dyn BrowserSession>>,
    ) -> SearchResult<SearchOutcome> {
        let mut results = Vec::new();
        let mut sources = BTreeMap::new();
        let mut from = Provenance::Cache;

        for (index, text) in keywords.iter().enumerate() {
            if index > 0 && self.settings.keyword_delay_ms > 0 {
                sleep(Duration::from_millis(self.settings.keyword_delay_ms)).await;
            }
            let keyword = Keyword {
                text: text.clone(),
                thresholds: request.thresholds,
                account_id: request.account_id.clone(),
            };
            let (candidates, provenance) = self.collect(&keyword, session).await?;
            let mut kept = apply_threshold_filter(candidates, &keyword.thresholds);
            kept.truncate(max_results);
            info!(
                keyword = %keyword.text,
                source = %provenance,
                kept = kept.len(),
                "keyword search finished"
            );
            results.extend(kept);
            sources.insert(keyword.text, provenance);
            from = provenance;
        }

        Ok(SearchOutcome {
            keywords,
            from,
            sources,
            count: results.len(),
            results,
        })
    }

    async fn collect(
        &self,
        keyword: &Keyword,
        session: &mut Option<Box<dyn BrowserSession>>,
    ) -> SearchResult<(Vec<ScrapedPost>, Provenance)> {
        self.cache.record_search(keyword, Utc::now()).await?;

        let cached = self
            .cache
            .find_cached(&self.settings.platform, keyword)
            .await?;
        if !cached.is_empty() && !self.is_stale(keyword, &cached).await? {
            debug!(keyword = %keyword.text, rows = cached.len(), "serving keyword from cache");
            return Ok((cached, Provenance::Cache));
        }

        if session.is_none() {
            *session = Some(self.sessions.acquire_session().await?);
            debug!("acquired browser session for request");
        }
        let active = session.as_deref().ok_or_else(|| {
            BrowserError::Unexpected("browser session missing after acquisition".to_string())
        })?;
        let posts = self.scrape(active, keyword).await?;
        self.cache
            .mark_live_fetch(&self.settings.platform, &keyword.text, Utc::now())
            .await?;
        Ok((posts, Provenance::Live))
    }

    /// Rows that already existed keep their original `created_at`, so the
    /// last live fetch is the reference. The newest row stands in for
    /// keywords that were never fetched through this store.
    async fn is_stale(&self, keyword: &Keyword, cached: &[ScrapedPost]) -> SearchResult<bool> {
        if !self.settings.refetch_after_cooldown {
            return Ok(false);
        }
        let fetched = self
            .cache
            .last_live_fetch(&self.settings.platform, &keyword.text)
            .await?;
        let reference = fetched.or_else(|| cached.iter().map(|post| post.created_at).max());
        Ok(reference
            .map(|at| can_repost(at, Utc::now()).allowed)
            .unwrap_or(false))
    }

    async fn scrape(
        &self,
        session: &dyn BrowserSession,
        keyword: &Keyword,
    ) -> SearchResult<Vec<ScrapedPost>> {
        let mut raw = self.scraper.fetch_raw_posts(session, &keyword.text).await?;
        let mut posts = Vec::new();
        for fragment in raw.by_ref() {
            let metrics = self.metrics.parse(&fragment.metrics_label);
            let reply = self.drafter.draft(&fragment.text).await;
            let post = ScrapedPost {
                platform: self.settings.platform.clone(),
                external_id: fragment.external_id,
                text: fragment.text,
                metrics,
                followers_count: 0,
                keyword: keyword.text.clone(),
                reply,
                created_at: Utc::now(),
            };
            if self.cache.upsert(&post).await? == UpsertOutcome::Skipped {
                trace!(external_id = %post.external_id, "post already stored");
            }
            posts.push(post);
        }
        debug!(
            keyword = %keyword.text,
            posts = posts.len(),
            discarded = raw.discarded(),
            "scraped keyword"
        );
        Ok(posts)
    }
}
