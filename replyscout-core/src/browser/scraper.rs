use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::ScraperSection;

use super::error::{BrowserError, BrowserResult};
use super::session::BrowserSession;

#[async_trait]
pub trait FeedPage: Send {
    async fn goto(&mut self, url: &str) -> BrowserResult<()>;
    async fn idle(&mut self, millis: u64) -> BrowserResult<()>;
    async fn scroll(&mut self, delta_y: f64) -> BrowserResult<()>;
    async fn extract_posts(&mut self, script: &str) -> BrowserResult<Vec<RawPostPayload>>;
    async fn close(self: Box<Self>) -> BrowserResult<()>;
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RawPostPayload {
    pub href: Option<String>,
    pub text: Option<String>,
    pub metrics_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    pub external_id: String,
    pub text: String,
    pub metrics_label: String,
}

/// Single-use sequence of extracted posts. Fragments without an id or text are
/// skipped while iterating, as are repeated ids.
#[derive(Debug)]
pub struct RawPosts {
    inner: std::vec::IntoIter<RawPostPayload>,
    seen: HashSet<String>,
    discarded: usize,
}

impl RawPosts {
    pub fn new(payloads: Vec<RawPostPayload>) -> Self {
        Self {
            inner: payloads.into_iter(),
            seen: HashSet::new(),
            discarded: 0,
        }
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

impl Iterator for RawPosts {
    type Item = RawPost;

    fn next(&mut self) -> Option<Self::Item> {
        for payload in self.inner.by_ref() {
            let external_id = payload.href.as_deref().and_then(parse_status_id);
            let text = payload
                .text
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty());
            let (external_id, text) = match (external_id, text) {
                (Some(id), Some(text)) => (id, text),
                _ => {
                    self.discarded += 1;
                    continue;
                }
            };
            if !self.seen.insert(external_id.clone()) {
                continue;
            }
            return Some(RawPost {
                external_id,
                text,
                metrics_label: payload.metrics_label.unwrap_or_default(),
            });
        }
        None
    }
}

/// Pulls the numeric post id out of a permalink such as
/// `/someone/status/1790000000000000000` (optionally followed by a subpath).
pub fn parse_status_id(href: &str) -> Option<String> {
    let (_, tail) = href.rsplit_once("/status/")?;
    let id = tail
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub search_base_url: String,
    pub initial_wait_ms: u64,
    pub scroll_cycles: usize,
    pub scroll_wait_ms: u64,
    pub scroll_distance_px: (u32, u32),
}

impl From<&ScraperSection> for ScrapeSettings {
    fn from(section: &ScraperSection) -> Self {
        Self {
            search_base_url: section.search_base_url.clone(),
            initial_wait_ms: section.initial_wait_ms,
            scroll_cycles: section.scroll_cycles,
            scroll_wait_ms: section.scroll_wait_ms,
            scroll_distance_px: (section.scroll_distance_px[0], section.scroll_distance_px[1]),
        }
    }
}

pub struct FeedScraper {
    settings: Arc<ScrapeSettings>,
}

impl FeedScraper {
    pub fn new(settings: Arc<ScrapeSettings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ScrapeSettings {
        &self.settings
    }

    pub fn build_search_url(&self, keyword: &str) -> BrowserResult<String> {
        let mut url = url::Url::parse(&self.settings.search_base_url).map_err(|err| {
            BrowserError::Configuration(format!(
                "invalid search url {}: {err}",
                self.settings.search_base_url
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("q", keyword)
            .append_pair("src", "typed_query")
            .append_pair("f", "live");
        Ok(url.into())
    }

    pub async fn fetch_raw_posts(
        &self,
        session: &dyn BrowserSession,
        keyword: &str,
    ) -> BrowserResult<RawPosts> {
        let url = self.build_search_url(keyword)?;
        trace!(keyword, url = %url, "opening search page");

        let mut page = session.open_page().await?;
        let payloads = self.drive(page.as_mut(), &url).await;
        if let Err(err) = page.close().await {
            debug!(error = %err, "failed to close search page");
        }
        let payloads = payloads?;
        debug!(keyword, fragments = payloads.len(), "extracted post fragments");
        Ok(RawPosts::new(payloads))
    }

    async fn drive(&self, page: &mut dyn FeedPage, url: &str) -> BrowserResult<Vec<RawPostPayload>> {
        page.goto(url).await?;
        page.idle(self.settings.initial_wait_ms).await?;
        for cycle in 0..self.settings.scroll_cycles {
            page.scroll(self.scroll_distance()).await?;
            page.idle(self.settings.scroll_wait_ms).await?;
            trace!(cycle, "scroll cycle finished");
        }
        page.extract_posts(POST_EXTRACTION_SCRIPT).await
    }

    fn scroll_distance(&self) -> f64 {
        let (low, high) = self.settings.scroll_distance_px;
        let lower = low.min(high);
        let upper = low.max(high);
        if lower == upper {
            return f64::from(lower);
        }
        let mut rng = rand::thread_rng();
        f64::from(rng.gen_range(lower..=upper))
    }
}

pub(crate) const POST_EXTRACTION_SCRIPT: &str = r#"
(() => {
    const posts = [];
    document.querySelectorAll('article[data-testid="tweet"]').forEach(article => {
        const textNode = article.querySelector('[data-testid="tweetText"]');
        const link = Array.from(article.querySelectorAll('a[href*="/status/"]'))
            .find(a => /\/status\/\d+$/.test(a.getAttribute('href') || ''));
        const group = article.querySelector('[role="group"][aria-label]');
        posts.push({
            href: link ? link.getAttribute('href') : null,
            text: textNode ? textNode.innerText : null,
            metrics_label: group ? group.getAttribute('aria-label') : null,
        });
    });
    return posts;
})()
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(href: Option<&str>, text: Option<&str>, label: Option<&str>) -> RawPostPayload {
        RawPostPayload {
            href: href.map(str::to_string),
            text: text.map(str::to_string),
            metrics_label: label.map(str::to_string),
        }
    }

    #[test]
    fn parses_ids_from_permalinks() {
        assert_eq!(
            parse_status_id("/rustlang/status/1790000000000000001"),
            Some("1790000000000000001".to_string())
        );
        assert_eq!(
            parse_status_id("https://x.com/a/status/42/analytics"),
            Some("42".to_string())
        );
        assert_eq!(parse_status_id("/rustlang"), None);
        assert_eq!(parse_status_id("/a/status/"), None);
    }

    #[test]
    fn raw_posts_drop_incomplete_and_repeated_fragments() {
        let mut posts = RawPosts::new(vec![
            payload(Some("/a/status/1"), Some("  first  "), Some("3 likes")),
            payload(None, Some("no id"), None),
            payload(Some("/b/status/2"), None, None),
            payload(Some("/b/status/3"), Some("   "), None),
            payload(Some("/a/status/1"), Some("first again"), None),
            payload(Some("/c/status/4"), Some("fourth"), None),
        ]);
        let collected = posts.by_ref().collect::<Vec<_>>();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].external_id, "1");
        assert_eq!(collected[0].text, "first");
        assert_eq!(collected[0].metrics_label, "3 likes");
        assert_eq!(collected[1].external_id, "4");
        assert_eq!(collected[1].metrics_label, "");
        assert_eq!(posts.discarded(), 3);
        assert!(posts.next().is_none());
    }

    #[test]
    fn search_url_escapes_keyword() {
        let scraper = FeedScraper::new(Arc::new(ScrapeSettings {
            search_base_url: "https://x.com/search".into(),
            initial_wait_ms: 0,
            scroll_cycles: 0,
            scroll_wait_ms: 0,
            scroll_distance_px: (100, 100),
        }));
        let url = scraper.build_search_url("rust & c++ #async").unwrap();
        let parsed = url::Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/search");
        let q = parsed
            .query_pairs()
            .find(|(key, _)| key == "q")
            .map(|(_, value)| value.into_owned());
        assert_eq!(q.as_deref(), Some("rust & c++ #async"));
        assert!(url.contains("rust+%26+c%2B%2B+%23async"));
    }
}
