use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use clap::Args;

/// Runs a keyword search: cache first, live scrape on a miss.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Comma-separated keywords
    pub keywords: String,
    /// Minimum like count (filters only when all three minimums are set)
    #[arg(long, default_value_t = 0)]
    pub min_likes: u64,
    /// Minimum repost count
    #[arg(long, default_value_t = 0)]
    pub min_retweets: u64,
    /// Minimum follower count
    #[arg(long, default_value_t = 0)]
    pub min_followers: u64,
    /// Results kept per keyword (defaults to search.default_max_results)
    #[arg(short = 'm', long)]
    pub max_results: Option<usize>,
    /// Account the search is recorded for
    #[arg(long)]
    pub account: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind (overrides server.bind)
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args, Debug, Clone)]
pub struct CooldownArgs {
    /// When the post was fetched (RFC 3339)
    pub fetched_at: DateTime<Utc>,
    /// Evaluation time, defaults to now
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,
}
