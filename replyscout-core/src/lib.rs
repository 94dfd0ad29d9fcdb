pub mod browser;
pub mod config;
pub mod cooldown;
pub mod engagement;
pub mod error;
pub mod http;
pub mod reply;
pub mod search;
pub mod sqlite;
pub mod store;

pub use browser::{
    BrowserError, BrowserMetrics, BrowserResult, BrowserSession, BrowserSessionManager, FeedPage,
    FeedScraper, RawPostPayload, ScrapeSettings, SessionProvider,
};
pub use config::{
    load_scout_config, BrowserSection, CompletionSection, HttpSection, ScoutConfig, ScraperSection,
    SearchSection, ServerSection, StorageSection,
};
pub use cooldown::{can_repost, repost_cooldown, CooldownDecision, REPOST_COOLDOWN_MINUTES};
pub use engagement::{EngagementMetrics, LabelPatternParser, MetricsExtractor};
pub use error::{ConfigError, Result};
pub use http::{HttpError, ResilientClient, RetryPolicy};
pub use reply::{render_prompt, ReplyComposer, ReplyDrafter};
pub use search::{
    PostView, SearchError, SearchOrchestrator, SearchOutcome, SearchRequest, SearchResponse,
    SearchResult, SearchSettings,
};
pub use store::{
    HistoryDecision, Keyword, NewPostHistory, PostCache, PostHistoryEntry, Provenance,
    ScrapedPost, SearchHistoryEntry, SqliteScoutStore, SqliteScoutStoreBuilder, StoreError,
    StoreResult, Thresholds, UpsertOutcome,
};
