use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::BrowserSection;

use super::error::{BrowserError, BrowserResult};
use super::metrics::BrowserMetrics;
use super::scraper::{FeedPage, RawPostPayload};

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn open_page(&self) -> BrowserResult<Box<dyn FeedPage>>;
    async fn release(self: Box<Self>) -> BrowserResult<()>;
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire_session(&self) -> BrowserResult<Box<dyn BrowserSession>>;
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: Option<String>,
}

/// Finds a running remotely-debuggable Chromium on the configured port, or
/// starts one with the persistent profile, and hands out connections to it.
#[derive(Debug)]
pub struct BrowserSessionManager {
    config: Arc<BrowserSection>,
    probe: reqwest::Client,
    launched: AsyncMutex<Option<Child>>,
    metrics: Arc<Mutex<BrowserMetrics>>,
}

impl BrowserSessionManager {
    pub fn new(config: BrowserSection) -> BrowserResult<Self> {
        std::fs::create_dir_all(&config.profile_dir).map_err(|err| {
            BrowserError::Profile(format!(
                "failed to create profile dir {}: {err}",
                config.profile_dir.display()
            ))
        })?;
        let probe = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|err| BrowserError::Configuration(err.to_string()))?;
        Ok(Self {
            config: Arc::new(config),
            probe,
            launched: AsyncMutex::new(None),
            metrics: Arc::new(Mutex::new(BrowserMetrics::default())),
        })
    }

    pub fn config(&self) -> &BrowserSection {
        &self.config
    }

    fn with_metrics<F>(&self, f: F)
    where
        F: FnOnce(&mut BrowserMetrics),
    {
        if let Ok(mut guard) = self.metrics.lock() {
            f(&mut guard);
        }
    }

    pub async fn probe(&self) -> Option<String> {
        let url = format!("{}/json/version", self.config.debug_endpoint());
        let response = self.probe.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let info = response.json::<VersionInfo>().await.ok()?;
        info.web_socket_debugger_url
    }

    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.config.debug_port),
            format!("--user-data-dir={}", self.config.profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-background-timer-throttling".to_string(),
            "--password-store=basic".to_string(),
        ];
        if self.config.headless {
            args.push("--headless=new".to_string());
        }
        if !self.config.sandbox {
            args.push("--no-sandbox".to_string());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    async fn launch(&self) -> BrowserResult<()> {
        let mut guard = self.launched.lock().await;
        if let Some(child) = guard.as_mut() {
            if child.try_wait()?.is_none() {
                debug!("launched chromium still starting, waiting on endpoint");
                return Ok(());
            }
        }
        info!(
            executable = %self.config.executable_path,
            port = self.config.debug_port,
            profile = %self.config.profile_dir.display(),
            headless = self.config.headless,
            "Launching Chromium instance"
        );
        let child = Command::new(&self.config.executable_path)
            .args(self.launch_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                BrowserError::Launch(format!("{}: {err}", self.config.executable_path))
            })?;
        *guard = Some(child);
        self.with_metrics(BrowserMetrics::record_launch);
        Ok(())
    }

    async fn wait_for_endpoint(&self) -> BrowserResult<String> {
        let attempts = self.config.launch_max_attempts.max(1);
        for attempt in 1..=attempts {
            sleep(self.config.poll_interval()).await;
            if let Some(ws_url) = self.probe().await {
                debug!(attempt, "debug endpoint became reachable");
                return Ok(ws_url);
            }
            let mut guard = self.launched.lock().await;
            if let Some(child) = guard.as_mut() {
                if let Some(status) = child.try_wait()? {
                    *guard = None;
                    return Err(BrowserError::Launch(format!(
                        "chromium exited before exposing its debug endpoint ({status})"
                    )));
                }
            }
        }
        Err(BrowserError::LaunchTimeout {
            endpoint: self.config.debug_endpoint(),
            attempts,
        })
    }

    pub async fn acquire(&self) -> BrowserResult<SessionHandle> {
        let ws_url = match self.probe().await {
            Some(url) => url,
            None => {
                self.launch().await?;
                self.wait_for_endpoint().await?
            }
        };
        debug!(ws_url = %ws_url, "connecting to chromium");
        let (browser, mut handler) = Browser::connect(ws_url.clone())
            .await
            .map_err(|err| BrowserError::Launch(format!("connect {ws_url}: {err}")))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });
        self.with_metrics(BrowserMetrics::record_session_acquired);
        Ok(SessionHandle {
            browser,
            handler_task: Some(handler_task),
            ws_url,
            page_timeout: self.config.request_timeout_seconds.map(Duration::from_secs),
            metrics: Arc::clone(&self.metrics),
        })
    }

    /// Stops a Chromium process this manager started. Browsers found already
    /// running are left alone.
    pub async fn shutdown(&self) -> BrowserResult<()> {
        let mut guard = self.launched.lock().await;
        if let Some(mut child) = guard.take() {
            info!("Shutting down launched Chromium instance");
            if let Err(err) = child.kill().await {
                warn!(error = %err, "Failed to stop chromium");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for BrowserSessionManager {
    async fn acquire_session(&self) -> BrowserResult<Box<dyn BrowserSession>> {
        Ok(Box::new(self.acquire().await?))
    }
}

#[derive(Debug)]
pub struct SessionHandle {
    browser: Browser,
    handler_task: Option<JoinHandle<()>>,
    ws_url: String,
    page_timeout: Option<Duration>,
    metrics: Arc<Mutex<BrowserMetrics>>,
}

#[async_trait]
impl BrowserSession for SessionHandle {
    async fn open_page(&self) -> BrowserResult<Box<dyn FeedPage>> {
        let page = self
            .browser
            .new_page(CreateTargetParams::new("about:blank"))
            .await?;
        if let Ok(mut guard) = self.metrics.lock() {
            guard.record_page_open();
        }
        Ok(Box::new(ChromiumFeedPage {
            page,
            timeout: self.page_timeout,
            metrics: Arc::clone(&self.metrics),
        }))
    }

    async fn release(mut self: Box<Self>) -> BrowserResult<()> {
        if let Some(handle) = self.handler_task.take() {
            handle.abort();
        }
        if let Ok(mut guard) = self.metrics.lock() {
            guard.record_session_released();
            info!(
                ws_url = %self.ws_url,
                browsers_launched = guard.browsers_launched,
                pages_opened = guard.pages_opened,
                scroll_cycles = guard.scroll_cycles,
                posts_extracted = guard.posts_extracted,
                open_sessions = guard.open_sessions(),
                "released browser session"
            );
        }
        Ok(())
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handler_task.take() {
            warn!(ws_url = %self.ws_url, "SessionHandle dropped without explicit release");
            handle.abort();
        }
    }
}

pub struct ChromiumFeedPage {
    page: Page,
    timeout: Option<Duration>,
    metrics: Arc<Mutex<BrowserMetrics>>,
}

impl ChromiumFeedPage {
    async fn bounded<F, T>(&self, what: &str, fut: F) -> BrowserResult<T>
    where
        F: std::future::Future<Output = BrowserResult<T>> + Send,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                BrowserError::Unexpected(format!("timed out after {limit:?} during {what}"))
            })?,
            None => fut.await,
        }
    }
}

#[async_trait]
impl FeedPage for ChromiumFeedPage {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        let page = &self.page;
        self.bounded("navigation", async move {
            page.goto(params).await?;
            page.wait_for_navigation().await?;
            Ok(())
        })
        .await
    }

    async fn idle(&mut self, millis: u64) -> BrowserResult<()> {
        if millis > 0 {
            sleep(Duration::from_millis(millis)).await;
        }
        Ok(())
    }

    async fn scroll(&mut self, delta_y: f64) -> BrowserResult<()> {
        let script = format!("window.scrollBy({{ top: {delta_y}, behavior: 'smooth' }});");
        self.page.evaluate(script.as_str()).await.map_err(|err| {
            BrowserError::Unexpected(format!("failed to execute scroll script: {err}"))
        })?;
        if let Ok(mut guard) = self.metrics.lock() {
            guard.record_scroll();
        }
        Ok(())
    }

    async fn extract_posts(&mut self, script: &str) -> BrowserResult<Vec<RawPostPayload>> {
        let value: serde_json::Value = self
            .page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|err| {
                BrowserError::Extraction(format!("failed to decode posts payload: {err}"))
            })?;
        let posts: Vec<RawPostPayload> = serde_json::from_value(value).map_err(|err| {
            BrowserError::Extraction(format!("failed to deserialize posts: {err}"))
        })?;
        if let Ok(mut guard) = self.metrics.lock() {
            guard.record_posts(posts.len() as u64);
        }
        Ok(posts)
    }

    async fn close(self: Box<Self>) -> BrowserResult<()> {
        self.page.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn section(profile_dir: PathBuf, port: u16) -> BrowserSection {
        BrowserSection {
            executable_path: "/definitely/not/chromium".into(),
            debug_host: "127.0.0.1".into(),
            debug_port: port,
            profile_dir,
            headless: true,
            sandbox: false,
            launch_poll_interval_ms: 10,
            launch_max_attempts: 2,
            request_timeout_seconds: None,
            extra_args: vec!["--disable-gpu".into()],
        }
    }

    #[test]
    fn launch_args_bind_port_and_profile() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BrowserSessionManager::new(section(dir.path().join("profile"), 9333)).unwrap();
        let args = manager.launch_args();
        assert!(args.contains(&"--remote-debugging-port=9333".to_string()));
        assert!(args
            .iter()
            .any(|arg| arg.starts_with("--user-data-dir=") && arg.ends_with("profile")));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--disable-gpu"));
        assert!(dir.path().join("profile").is_dir());
    }

    #[tokio::test]
    async fn missing_executable_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        // Port 9 (discard) has nothing serving CDP.
        let manager = BrowserSessionManager::new(section(dir.path().to_path_buf(), 9)).unwrap();
        assert!(manager.probe().await.is_none());
        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, BrowserError::Launch(_)), "got {err:?}");
        let metrics = manager.metrics.lock().unwrap();
        assert_eq!(metrics.sessions_acquired, 0);
        assert_eq!(metrics.open_sessions(), 0);
    }
}
