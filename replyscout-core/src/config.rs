use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoutConfig {
    pub storage: StorageSection,
    pub browser: BrowserSection,
    pub scraper: ScraperSection,
    pub http: HttpSection,
    pub completion: CompletionSection,
    pub search: SearchSection,
    pub server: ServerSection,
}

impl ScoutConfig {
    /// Resolves relative paths against the directory holding the config file.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        self.storage.database_path = resolve(base_dir, &self.storage.database_path);
        self.browser.profile_dir = resolve(base_dir, &self.browser.profile_dir);
    }

    pub fn validate(&self) -> Result<()> {
        if self.http.initial_delay_ms > self.http.max_delay_ms {
            return Err(ConfigError::Invalid {
                field: "http.initial_delay_ms",
                reason: format!(
                    "{} exceeds http.max_delay_ms ({})",
                    self.http.initial_delay_ms, self.http.max_delay_ms
                ),
            });
        }
        if self.browser.launch_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "browser.launch_max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.completion.prompt_template.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "completion.prompt_template",
                reason: "must not be empty".into(),
            });
        }
        url::Url::parse(&self.scraper.search_base_url).map_err(|err| ConfigError::Invalid {
            field: "scraper.search_base_url",
            reason: err.to_string(),
        })?;
        Ok(())
    }
}

fn resolve(base_dir: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    pub executable_path: String,
    pub debug_host: String,
    pub debug_port: u16,
    pub profile_dir: PathBuf,
    pub headless: bool,
    pub sandbox: bool,
    pub launch_poll_interval_ms: u64,
    pub launch_max_attempts: u32,
    pub request_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl BrowserSection {
    pub fn debug_endpoint(&self) -> String {
        format!("http://{}:{}", self.debug_host, self.debug_port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.launch_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperSection {
    pub search_base_url: String,
    pub initial_wait_ms: u64,
    pub scroll_cycles: usize,
    pub scroll_wait_ms: u64,
    pub scroll_distance_px: [u32; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSection {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default)]
    pub force_resolve: bool,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionSection {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub api_key: Option<String>,
    pub prompt_template: String,
}

impl CompletionSection {
    /// Explicit key first, then the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    pub platform: String,
    pub keyword_delay_ms: u64,
    pub default_max_results: usize,
    #[serde(default)]
    pub refetch_after_cooldown: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub bind: SocketAddr,
}

pub fn load_scout_config<P: AsRef<Path>>(path: P) -> Result<ScoutConfig> {
    let path = path.as_ref();
    let mut config: ScoutConfig = load_toml(path)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    config.resolve_paths(&base_dir);
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/scout.toml");
        let config = load_scout_config(&path).expect("config should parse");
        assert_eq!(config.browser.debug_port, 9222);
        assert_eq!(config.http.max_retries, 3);
        assert_eq!(config.http.initial_delay_ms, 1000);
        assert_eq!(config.http.max_delay_ms, 10000);
        assert_eq!(config.search.platform, "x");
        assert!(config.completion.prompt_template.contains("{text}"));
        assert!(config.storage.database_path.is_absolute());
    }

    #[test]
    fn rejects_inverted_backoff_window() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/scout.toml");
        let mut config = load_scout_config(&path).unwrap();
        config.http.initial_delay_ms = 20_000;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "http.initial_delay_ms",
                ..
            }
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_scout_config("/nonexistent/scout.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/scout.toml"));
    }
}
