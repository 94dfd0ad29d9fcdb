use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::HttpSection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Resolve and pin the target address on the first attempt too.
    pub force_resolve: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            force_resolve: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(config: &HttpSection) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.initial_delay_ms)),
            force_resolve: config.force_resolve,
        }
    }

    pub fn with_force_resolve(mut self, value: bool) -> Self {
        self.force_resolve = value;
        self
    }

    /// Delay before retry number `retry` (0-based): doubles each time, capped
    /// at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// A server-provided `Retry-After` wins over the computed delay, still
    /// bounded by `max_delay`.
    pub fn next_delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|wait| wait.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for_retry(retry))
    }
}

/// Accepts delta-seconds or an HTTP-date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let wait = at.signed_duration_since(Utc::now());
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
