use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("debug endpoint {endpoint} unreachable after {attempts} attempts")]
    LaunchTimeout { endpoint: String, attempts: u32 },
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("profile error: {0}")]
    Profile(String),
    #[error("post extraction failed: {0}")]
    Extraction(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<tokio::task::JoinError> for BrowserError {
    fn from(err: tokio::task::JoinError) -> Self {
        BrowserError::Unexpected(err.to_string())
    }
}
