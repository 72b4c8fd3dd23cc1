//! Fixed-window entry and the transition applied on every check.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::policy::Policy;

/// Quota state for one identifier while its window is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests counted in the current window, including the one that opened it
    pub count: u64,
    /// Epoch milliseconds at which the window ends
    pub reset_at_ms: i64,
}

impl RateLimitEntry {
    /// Open a fresh window at `now_ms`.
    pub fn open(policy: Policy, now_ms: i64) -> Self {
        Self {
            count: 1,
            reset_at_ms: now_ms.saturating_add(policy.window_ms_i64()),
        }
    }

    /// Whether the window has elapsed. The end instant itself counts as expired.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.reset_at_ms <= now_ms
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u64,
    #[serde(rename = "reset_at")]
    pub reset_at_ms: i64,
}

impl Decision {
    /// The end of the window as a UTC timestamp.
    pub fn reset_at(&self) -> DateTime<Utc> {
        timestamp_from_ms(self.reset_at_ms)
    }
}

/// Epoch milliseconds as a UTC timestamp, clamped to the epoch when out of range.
pub fn timestamp_from_ms(epoch_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(epoch_ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Apply one check to the slot held for an identifier.
///
/// Stores call this while holding whatever lock guards the slot, so the
/// read-modify-write is atomic per identifier. A denied check leaves the
/// entry untouched.
pub fn apply_hit(slot: &mut Option<RateLimitEntry>, policy: Policy, now_ms: i64) -> Decision {
    match slot {
        Some(entry) if !entry.is_expired(now_ms) => {
            if entry.count >= policy.limit {
                return Decision {
                    allowed: false,
                    remaining: 0,
                    reset_at_ms: entry.reset_at_ms,
                };
            }
            entry.count += 1;
            Decision {
                allowed: true,
                remaining: policy.limit - entry.count,
                reset_at_ms: entry.reset_at_ms,
            }
        }
        _ => {
            let entry = RateLimitEntry::open(policy, now_ms);
            *slot = Some(entry);
            Decision {
                allowed: true,
                remaining: policy.limit.saturating_sub(entry.count),
                reset_at_ms: entry.reset_at_ms,
            }
        }
    }
}
