mod error;
mod metrics;
mod scraper;
mod session;

pub use error::{BrowserError, BrowserResult};
pub use metrics::BrowserMetrics;
pub use scraper::{
    parse_status_id, FeedPage, FeedScraper, RawPost, RawPostPayload, RawPosts, ScrapeSettings,
};
pub use session::{
    BrowserSession, BrowserSessionManager, ChromiumFeedPage, SessionHandle, SessionProvider,
};
