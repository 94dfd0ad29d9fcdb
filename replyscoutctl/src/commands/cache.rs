use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Lists cached posts, newest fetch first
    List(CacheListArgs),
    /// Removes a cached post
    Delete(CacheDeleteArgs),
    /// Overwrites the drafted reply of a cached post
    UpdateReply(CacheUpdateReplyArgs),
    /// Shows the search history
    Searches(CacheSearchesArgs),
}

#[derive(Args, Debug)]
pub struct CacheListArgs {
    #[arg(long)]
    pub keyword: Option<String>,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct CacheDeleteArgs {
    /// Post id on the platform
    pub id: String,
}

#[derive(Args, Debug)]
pub struct CacheUpdateReplyArgs {
    pub id: String,
    pub reply: String,
}

#[derive(Args, Debug)]
pub struct CacheSearchesArgs {
    #[arg(long)]
    pub keyword: Option<String>,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
