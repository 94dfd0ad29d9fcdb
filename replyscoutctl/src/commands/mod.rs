pub mod cache;
pub mod history;
pub mod search;

pub use cache::{CacheCommands, CacheDeleteArgs, CacheListArgs, CacheSearchesArgs, CacheUpdateReplyArgs};
pub use history::{
    HistoryAddArgs, HistoryCommands, HistoryDeleteArgs, HistoryListArgs, HistoryRefreshArgs,
    HistoryRepostArgs,
};
pub use search::{CooldownArgs, SearchArgs, ServeArgs};
