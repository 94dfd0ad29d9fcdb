pub mod commands;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use replyscout_core::browser::{BrowserSessionManager, FeedScraper, ScrapeSettings, SessionProvider};
use replyscout_core::{
    can_repost, load_scout_config, CooldownDecision, HistoryDecision, LabelPatternParser,
    NewPostHistory, PostHistoryEntry, PostView, ReplyComposer, ResilientClient, ScoutConfig,
    SearchHistoryEntry, SearchOrchestrator, SearchRequest, SearchResponse, SearchSettings,
    SqliteScoutStore, Thresholds,
};

use crate::commands::{
    CacheCommands, CacheListArgs, CacheSearchesArgs, CooldownArgs, HistoryAddArgs,
    HistoryCommands, HistoryListArgs, SearchArgs, ServeArgs,
};
use crate::server::AppState;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] replyscout_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] replyscout_core::StoreError),
    #[error("search error: {0}")]
    Search(#[from] replyscout_core::SearchError),
    #[error("browser error: {0}")]
    Browser(#[from] replyscout_core::BrowserError),
    #[error("http client error: {0}")]
    Http(#[from] replyscout_core::HttpError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Keyword search, reply drafting and post history", long_about = None)]
pub struct Cli {
    /// Path to scout.toml
    #[arg(long, default_value = "configs/scout.toml")]
    pub config: PathBuf,
    /// Alternative SQLite database (overrides storage.database_path)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Searches keywords and prints the aggregated results
    Search(SearchArgs),
    /// Serves the search API over HTTP
    Serve(ServeArgs),
    /// Cached posts and search history
    #[command(subcommand)]
    Cache(CacheCommands),
    /// Published posts, reposts and engagement refreshes
    #[command(subcommand)]
    History(HistoryCommands),
    /// Evaluates the repost cooldown for a fetch time
    Cooldown(CooldownArgs),
    /// Creates the database schema
    Init,
    /// Prints shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Installs the fmt subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(*shell, &mut command, "replyscoutctl", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Cooldown(args) => {
            let decision = can_repost(args.fetched_at, args.now.unwrap_or_else(Utc::now));
            return render(&decision, cli.format);
        }
        _ => {}
    }

    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Search(args) => {
            let response = context.search(args).await?;
            render(&response, cli.format)?;
        }
        Commands::Serve(args) => context.serve(args).await?,
        Commands::Cache(CacheCommands::List(args)) => {
            let posts = context.cache_list(args)?;
            render(&posts, cli.format)?;
        }
        Commands::Cache(CacheCommands::Delete(args)) => {
            if !context.store.delete_post(context.platform(), &args.id)? {
                return Err(AppError::NotFound(format!("post {}", args.id)));
            }
            render(&Ack::new(format!("deleted post {}", args.id)), cli.format)?;
        }
        Commands::Cache(CacheCommands::UpdateReply(args)) => {
            let post = context
                .store
                .update_reply(context.platform(), &args.id, &args.reply)?
                .ok_or_else(|| AppError::NotFound(format!("post {}", args.id)))?;
            render(&PostView::from(&post), cli.format)?;
        }
        Commands::Cache(CacheCommands::Searches(args)) => {
            let searches = context.cache_searches(args)?;
            render(&searches, cli.format)?;
        }
        Commands::History(HistoryCommands::Add(args)) => {
            let entry = context.history_add(args)?;
            render(&entry, cli.format)?;
        }
        Commands::History(HistoryCommands::List(args)) => {
            let entries = context.history_list(args)?;
            render(&entries, cli.format)?;
        }
        Commands::History(HistoryCommands::Repost(args)) => {
            let decision = context.store.repost(args.id, Utc::now())?;
            render(&decision, cli.format)?;
        }
        Commands::History(HistoryCommands::Refresh(args)) => {
            let decision =
                context
                    .store
                    .refresh_engagement(args.id, args.likes, args.retweets, Utc::now())?;
            render(&decision, cli.format)?;
        }
        Commands::History(HistoryCommands::Delete(args)) => {
            if !context.store.soft_delete(args.id, Utc::now())? {
                return Err(AppError::NotFound(format!("history entry {}", args.id)));
            }
            render(&Ack::new(format!("deleted history entry {}", args.id)), cli.format)?;
        }
        Commands::Init => {
            render(
                &Ack::new(format!(
                    "database ready at {}",
                    context.store.path().display()
                )),
                cli.format,
            )?;
        }
        Commands::Cooldown(_) | Commands::Completions { .. } => {}
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: ScoutConfig,
    store: SqliteScoutStore,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = load_scout_config(&cli.config)?;
        if let Some(db) = &cli.db {
            config.storage.database_path = db.clone();
        }
        let store = SqliteScoutStore::new(&config.storage.database_path)?;
        store.initialize()?;
        Ok(Self { config, store })
    }

    fn platform(&self) -> &str {
        &self.config.search.platform
    }

    fn search_stack(&self) -> Result<(SearchOrchestrator, Arc<BrowserSessionManager>)> {
        let manager = Arc::new(BrowserSessionManager::new(self.config.browser.clone())?);
        let client = ResilientClient::from_config(&self.config.http)?;
        let composer = ReplyComposer::new(client, &self.config.completion);
        let sessions: Arc<dyn SessionProvider> = manager.clone();
        let orchestrator = SearchOrchestrator::new(
            sessions,
            FeedScraper::new(Arc::new(ScrapeSettings::from(&self.config.scraper))),
            Arc::new(LabelPatternParser::new()),
            composer.into_shared(),
            Arc::new(self.store.clone()),
            SearchSettings::from_config(&self.config),
        );
        Ok((orchestrator, manager))
    }

    async fn search(&self, args: &SearchArgs) -> Result<SearchResponse> {
        let (orchestrator, manager) = self.search_stack()?;
        let request = SearchRequest {
            keywords: args.keywords.clone(),
            thresholds: Thresholds::new(args.min_likes, args.min_retweets, args.min_followers),
            max_results: args.max_results,
            account_id: args.account.clone(),
        };
        let outcome = orchestrator.search(&request).await;
        if let Err(err) = manager.shutdown().await {
            warn!(error = %err, "browser shutdown failed");
        }
        Ok(SearchResponse::from(&outcome?))
    }

    async fn serve(&self, args: &ServeArgs) -> Result<()> {
        let (orchestrator, manager) = self.search_stack()?;
        let bind = args.bind.unwrap_or(self.config.server.bind);
        let state = AppState::new(orchestrator, self.store.clone());
        let served = server::serve(state, bind).await;
        if let Err(err) = manager.shutdown().await {
            warn!(error = %err, "browser shutdown failed");
        }
        info!("server stopped");
        Ok(served?)
    }

    fn cache_list(&self, args: &CacheListArgs) -> Result<PostList> {
        let rows = self
            .store
            .list_posts(self.platform(), args.keyword.as_deref(), args.limit)?
            .iter()
            .map(PostView::from)
            .collect();
        Ok(PostList { rows })
    }

    fn cache_searches(&self, args: &CacheSearchesArgs) -> Result<SearchLog> {
        let rows = self
            .store
            .search_history(args.keyword.as_deref(), args.limit)?;
        Ok(SearchLog { rows })
    }

    fn history_add(&self, args: &HistoryAddArgs) -> Result<PostHistoryEntry> {
        let new = NewPostHistory {
            account_id: args.account.clone(),
            text: args.text.clone(),
            url: args.url.clone(),
            keyword: args.keyword.clone(),
            posted_at: args.posted_at,
        };
        Ok(self.store.record_post(&new, Utc::now())?)
    }

    fn history_list(&self, args: &HistoryListArgs) -> Result<HistoryList> {
        let rows =
            self.store
                .list_history(args.account.as_deref(), args.include_deleted, args.limit)?;
        Ok(HistoryList { rows })
    }
}

#[derive(Debug, Serialize)]
struct Ack {
    message: String,
}

impl Ack {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl DisplayFallback for Ack {
    fn display(&self) -> String {
        self.message.clone()
    }
}

#[derive(Debug, Serialize)]
struct PostList {
    rows: Vec<PostView>,
}

#[derive(Debug, Serialize)]
struct SearchLog {
    rows: Vec<SearchHistoryEntry>,
}

#[derive(Debug, Serialize)]
struct HistoryList {
    rows: Vec<PostHistoryEntry>,
}

fn post_line(post: &PostView) -> String {
    let mut line = format!(
        "{} [{}] likes={} reposts={} replies={} views={} | {}",
        post.id,
        post.keyword,
        post.like_count,
        post.retweet_count,
        post.reply_count,
        post.view_count,
        post.text.replace('\n', " ")
    );
    if !post.reply.is_empty() {
        line.push_str(&format!("\n    reply: {}", post.reply.replace('\n', " ")));
    }
    line
}

impl DisplayFallback for PostView {
    fn display(&self) -> String {
        post_line(self)
    }
}

impl DisplayFallback for SearchResponse {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "{} result(s) for {} (from {})",
            self.count,
            self.keywords.join(", "),
            self.from
        )];
        for (keyword, source) in &self.sources {
            lines.push(format!("  - {keyword}: {source}"));
        }
        lines.extend(self.tweets.iter().map(post_line));
        lines.join("\n")
    }
}

impl DisplayFallback for PostList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No cached posts".to_string();
        }
        self.rows
            .iter()
            .map(post_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for SearchLog {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No searches recorded".to_string();
        }
        self.rows
            .iter()
            .map(|entry| {
                format!(
                    "{} | {} | likes>={} reposts>={} followers>={}",
                    entry.searched_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.keyword,
                    entry.thresholds.min_likes,
                    entry.thresholds.min_retweets,
                    entry.thresholds.min_followers
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for PostHistoryEntry {
    fn display(&self) -> String {
        let state = if self.is_deleted() { " (deleted)" } else { "" };
        format!(
            "#{} {}{} | likes={} reposts={} | fetched {} | {}",
            self.id,
            self.account_id,
            state,
            self.like_count,
            self.retweet_count,
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            self.text.replace('\n', " ")
        )
    }
}

impl DisplayFallback for HistoryList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No history entries".to_string();
        }
        self.rows
            .iter()
            .map(|entry| entry.display())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for HistoryDecision {
    fn display(&self) -> String {
        match self {
            HistoryDecision::Applied { entry } => format!("applied: {}", entry.display()),
            HistoryDecision::CoolingDown { remaining_seconds } => format!(
                "cooling down: {} minute(s) left",
                (remaining_seconds + 59) / 60
            ),
            HistoryDecision::NotFound => "history entry not found".to_string(),
        }
    }
}

impl DisplayFallback for CooldownDecision {
    fn display(&self) -> String {
        match self.remaining_minutes() {
            Some(minutes) if !self.allowed => format!("cooling down: {minutes} minute(s) left"),
            _ => "repost allowed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn cli(db: &std::path::Path, args: &[&str]) -> Cli {
        let db = db.to_string_lossy().to_string();
        let mut argv = vec![
            "replyscoutctl",
            "--config",
            "../configs/scout.toml",
            "--db",
            db.as_str(),
        ];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn parses_search_arguments() {
        let cli = Cli::try_parse_from([
            "replyscoutctl",
            "--format",
            "json",
            "search",
            "rust,tokio",
            "--min-likes",
            "5",
            "-m",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.keywords, "rust,tokio");
                assert_eq!(args.min_likes, 5);
                assert_eq!(args.min_retweets, 0);
                assert_eq!(args.max_results, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_cooldown_timestamps() {
        let cli = Cli::try_parse_from([
            "replyscoutctl",
            "cooldown",
            "2024-05-01T10:00:00Z",
            "--now",
            "2024-05-01T11:30:00Z",
        ])
        .unwrap();
        let Commands::Cooldown(args) = cli.command else {
            panic!("expected cooldown command");
        };
        let decision = can_repost(args.fetched_at, args.now.unwrap());
        assert!(!decision.allowed);
        assert_eq!(decision.display(), "cooling down: 30 minute(s) left");
    }

    #[tokio::test]
    async fn history_commands_round_trip_through_the_store() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("scout.sqlite");

        run(cli(&db, &["history", "add", "--account", "acct", "--text", "hello"]))
            .await
            .unwrap();
        run(cli(&db, &["history", "repost", "1"])).await.unwrap();
        run(cli(&db, &["history", "delete", "1"])).await.unwrap();

        let err = run(cli(&db, &["history", "delete", "1"])).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let store = SqliteScoutStore::new(&db).unwrap();
        let entries = store.list_history(Some("acct"), true, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_deleted());
        assert!(entries[0].reposted_at.is_none());
    }

    #[tokio::test]
    async fn cache_commands_report_missing_posts() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("scout.sqlite");
        let err = run(cli(&db, &["cache", "delete", "42"])).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = run(cli(&db, &["cache", "update-reply", "42", "hi"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        run(cli(&db, &["cache", "list"])).await.unwrap();
    }

    #[test]
    fn history_decisions_render_as_text() {
        let decision = HistoryDecision::CoolingDown {
            remaining_seconds: 61,
        };
        assert_eq!(decision.display(), "cooling down: 2 minute(s) left");
        assert_eq!(HistoryDecision::NotFound.display(), "history entry not found");
    }
}
