use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    HostNotFound,
    Timeout,
    ConnectionRefused,
    Other,
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("unexpected status {status}")]
    Status {
        status: u16,
        retry_after: Option<Duration>,
        body: String,
    },
    #[error("network error ({kind:?}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },
    #[error("failed to resolve {host}: {message}")]
    Resolve { host: String, message: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn network_kind(&self) -> Option<NetworkErrorKind> {
        match self {
            HttpError::Network { kind, .. } => Some(*kind),
            HttpError::Resolve { .. } => Some(NetworkErrorKind::HostNotFound),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HttpError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Rate limiting and the transient network classes are retried; any other
    /// status or failure surfaces immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Status { status, .. } => *status == 429,
            _ => matches!(
                self.network_kind(),
                Some(
                    NetworkErrorKind::HostNotFound
                        | NetworkErrorKind::Timeout
                        | NetworkErrorKind::ConnectionRefused
                )
            ),
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let message = err.to_string();
        let kind = classify_reqwest(&err);
        HttpError::Network { kind, message }
    }
}

fn classify_reqwest(err: &reqwest::Error) -> NetworkErrorKind {
    if err.is_timeout() {
        return NetworkErrorKind::Timeout;
    }
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    return NetworkErrorKind::ConnectionRefused
                }
                std::io::ErrorKind::TimedOut => return NetworkErrorKind::Timeout,
                _ => {}
            }
        }
        let text = current.to_string().to_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("no such host")
        {
            return NetworkErrorKind::HostNotFound;
        }
        if text.contains("connection refused") {
            return NetworkErrorKind::ConnectionRefused;
        }
        source = current.source();
    }
    NetworkErrorKind::Other
}
