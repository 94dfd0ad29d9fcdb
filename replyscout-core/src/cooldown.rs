use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const REPOST_COOLDOWN_MINUTES: i64 = 120;

pub fn repost_cooldown() -> Duration {
    Duration::minutes(REPOST_COOLDOWN_MINUTES)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CooldownDecision {
    pub allowed: bool,
    #[serde(
        rename = "remaining_seconds",
        serialize_with = "serialize_remaining",
        skip_serializing_if = "Option::is_none"
    )]
    pub remaining: Option<Duration>,
}

impl CooldownDecision {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            remaining: None,
        }
    }

    pub fn cooling_down(remaining: Duration) -> Self {
        Self {
            allowed: false,
            remaining: Some(remaining),
        }
    }

    pub fn remaining_minutes(&self) -> Option<i64> {
        self.remaining.map(|left| {
            let seconds = left.num_seconds();
            (seconds + 59) / 60
        })
    }
}

fn serialize_remaining<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(left) => serializer.serialize_i64(left.num_seconds()),
        None => serializer.serialize_none(),
    }
}

/// Disallowed for exactly two hours after `fetched_at`; allowed from the
/// two-hour mark onwards. A `fetched_at` in the future counts the full window.
pub fn can_repost(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> CooldownDecision {
    let unlocks_at = fetched_at + repost_cooldown();
    if now >= unlocks_at {
        CooldownDecision::allowed()
    } else {
        CooldownDecision::cooling_down(unlocks_at - now)
    }
}
