pub mod cache;
pub mod error;
pub mod history;
pub mod models;
pub mod posts;

pub use cache::PostCache;
pub use error::{StoreError, StoreResult};
pub use models::{
    HistoryDecision, Keyword, NewPostHistory, PostHistoryEntry, Provenance, ScrapedPost,
    SearchHistoryEntry, Thresholds, UpsertOutcome,
};
pub use posts::{SqliteScoutStore, SqliteScoutStoreBuilder};
