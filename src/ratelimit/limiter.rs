//! Core rate limiter implementation.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::entry::{Decision, RateLimitEntry};
use super::policy::{Policy, PolicyTable};
use super::store::{MemoryStore, RateLimitStore};

/// Fixed-window rate limiter.
///
/// Each instance owns its store and policy table, so isolated limiters can
/// coexist in one process. Share it behind an `Arc`.
pub struct RateLimiter {
    /// Entry storage
    store: Arc<dyn RateLimitStore>,
    /// Named policies
    policies: PolicyTable,
}

impl RateLimiter {
    /// Create an in-memory rate limiter with the built-in policy table.
    pub fn new() -> Self {
        Self::with_policies(PolicyTable::builtin())
    }

    /// Create an in-memory rate limiter with the given policy table.
    pub fn with_policies(policies: PolicyTable) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), policies)
    }

    /// Create a rate limiter over an arbitrary store.
    pub fn with_store(store: Arc<dyn RateLimitStore>, policies: PolicyTable) -> Self {
        Self { store, policies }
    }

    /// The policy table this limiter resolves names against.
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Check `identifier` against the named policy.
    ///
    /// Unknown policy names fall back to the default policy. Callers taking
    /// names from outside input validate them with [`RateLimiter::has_policy`].
    pub async fn check(&self, identifier: &str, policy_name: &str) -> Decision {
        if !self.has_policy(policy_name) {
            warn!(
                policy = %policy_name,
                "Unknown rate limit policy, using default"
            );
        }
        self.check_with(identifier, self.policies.resolve(policy_name))
            .await
    }

    /// Whether `policy_name` names a policy in this limiter's table.
    pub fn has_policy(&self, policy_name: &str) -> bool {
        self.policies.get(policy_name).is_some()
    }

    /// Check `identifier` against an ad hoc policy.
    pub async fn check_with(&self, identifier: &str, policy: Policy) -> Decision {
        self.check_at(identifier, policy, now_ms()).await
    }

    /// Check `identifier` as of `now_ms` (epoch milliseconds).
    pub async fn check_at(&self, identifier: &str, policy: Policy, now_ms: i64) -> Decision {
        let decision = self.store.hit(identifier, policy, now_ms).await;

        if decision.allowed {
            trace!(
                identifier = %identifier,
                remaining = decision.remaining,
                reset_at = decision.reset_at_ms,
                "Request allowed"
            );
        } else {
            debug!(
                identifier = %identifier,
                limit = policy.limit,
                window_ms = policy.window_ms,
                reset_at = decision.reset_at_ms,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Drop any quota state held for `identifier`.
    pub async fn reset(&self, identifier: &str) {
        if self.store.remove(identifier).await {
            info!(identifier = %identifier, "Rate limit reset");
        }
    }

    /// Delete expired entries. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(now_ms()).await
    }

    /// Delete entries whose window ended at or before `now_ms`.
    pub async fn sweep_at(&self, now_ms: i64) -> usize {
        let removed = self.store.purge_expired(now_ms).await;
        if removed > 0 {
            let remaining_entries = self.store.len().await;
            debug!(
                removed_entries = removed,
                remaining_entries,
                "Rate limit sweep completed"
            );
        }
        removed
    }

    /// The stored entry for `identifier`, if any.
    pub async fn entry(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.store.get(identifier).await
    }

    /// Number of identifiers currently holding an entry.
    pub async fn active_entries(&self) -> usize {
        self.store.len().await
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
