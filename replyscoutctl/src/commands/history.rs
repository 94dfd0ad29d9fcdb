use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// Records a published post
    Add(HistoryAddArgs),
    /// Lists recorded posts
    List(HistoryListArgs),
    /// Reposts an entry once its cooldown has passed
    Repost(HistoryRepostArgs),
    /// Stores refreshed engagement counts once the cooldown has passed
    Refresh(HistoryRefreshArgs),
    /// Soft-deletes an entry
    Delete(HistoryDeleteArgs),
}

#[derive(Args, Debug)]
pub struct HistoryAddArgs {
    #[arg(long)]
    pub account: String,
    #[arg(long)]
    pub text: String,
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub keyword: Option<String>,
    /// Publication time on the platform (RFC 3339)
    #[arg(long)]
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub struct HistoryListArgs {
    #[arg(long)]
    pub account: Option<String>,
    #[arg(long, default_value_t = false)]
    pub include_deleted: bool,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct HistoryRepostArgs {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct HistoryRefreshArgs {
    pub id: i64,
    #[arg(long)]
    pub likes: u64,
    #[arg(long)]
    pub retweets: u64,
}

#[derive(Args, Debug)]
pub struct HistoryDeleteArgs {
    pub id: i64,
}
