use thiserror::Error;

use crate::browser::BrowserError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid search request: {0}")]
    InvalidRequest(String),
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;
