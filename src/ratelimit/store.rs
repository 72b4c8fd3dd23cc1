//! Storage backends for rate limit entries.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::entry::{apply_hit, Decision, RateLimitEntry};
use super::policy::Policy;

/// Trait for rate limit entry storage.
///
/// This is the seam between the limiter and where its counters live. The
/// in-process [`MemoryStore`] enforces limits per process; a store backed by a
/// shared counter service can be dropped in without changing the limiter.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Apply one check for `identifier`.
    ///
    /// Must be atomic per identifier: concurrent calls may not push the
    /// count past `policy.limit`.
    async fn hit(&self, identifier: &str, policy: Policy, now_ms: i64) -> Decision;

    /// The stored entry for `identifier`, expired or not.
    async fn get(&self, identifier: &str) -> Option<RateLimitEntry>;

    /// Delete the entry for `identifier`. Returns whether one existed.
    async fn remove(&self, identifier: &str) -> bool;

    /// Delete every entry whose window ended at or before `now_ms`.
    async fn purge_expired(&self, now_ms: i64) -> usize;

    /// Number of stored entries.
    async fn len(&self) -> usize;
}

/// Process-local store.
///
/// Entries are sharded across a `DashMap`; the entry API holds the shard lock
/// for the whole read-modify-write of a check.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(&self, identifier: &str, policy: Policy, now_ms: i64) -> Decision {
        match self.entries.entry(identifier.to_string()) {
            Entry::Occupied(mut occupied) => {
                let mut slot = Some(*occupied.get());
                let decision = apply_hit(&mut slot, policy, now_ms);
                if let Some(entry) = slot {
                    occupied.insert(entry);
                }
                decision
            }
            Entry::Vacant(vacant) => {
                let mut slot = None;
                let decision = apply_hit(&mut slot, policy, now_ms);
                if let Some(entry) = slot {
                    vacant.insert(entry);
                }
                decision
            }
        }
    }

    async fn get(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.entries.get(identifier).map(|entry| *entry)
    }

    async fn remove(&self, identifier: &str) -> bool {
        self.entries.remove(identifier).is_some()
    }

    async fn purge_expired(&self, now_ms: i64) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired(now_ms);
            if expired {
                removed += 1;
            }
            !expired
        });
        removed
    }

    async fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn policy(limit: u64, window_ms: u64) -> Policy {
        Policy::new(limit, window_ms).unwrap()
    }

    #[tokio::test]
    async fn test_hit_creates_entry() {
        let store = MemoryStore::new();
        let decision = store.hit("ip:10.0.0.1", policy(5, 1000), 0).await;

        assert!(decision.allowed);
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get("ip:10.0.0.1").await,
            Some(RateLimitEntry { count: 1, reset_at_ms: 1000 })
        );
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = MemoryStore::new();
        assert!(!store.remove("user:nobody").await);

        store.hit("user:alice", policy(5, 1000), 0).await;
        assert!(store.remove("user:alice").await);
        assert!(!store.remove("user:alice").await);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_entries() {
        let store = MemoryStore::new();
        store.hit("short", policy(5, 100), 0).await;
        store.hit("long", policy(5, 10_000), 0).await;

        assert_eq!(store.purge_expired(100).await, 1);
        assert!(store.get("short").await.is_none());
        assert!(store.get("long").await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_purge_count_ignores_concurrent_inserts() {
        let store = Arc::new(MemoryStore::new());
        let short = policy(5, 10);
        for i in 0..500 {
            store.hit(&format!("ip:expired-{}", i), short, 0).await;
        }

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    store.hit(&format!("ip:fresh-{}", i), policy(5, 60_000), 100).await;
                }
            })
        };
        let removed = store.purge_expired(100).await;
        writer.await.unwrap();

        assert_eq!(removed, 500);
        assert_eq!(store.len().await, 500);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_hits_never_exceed_limit() {
        let store = Arc::new(MemoryStore::new());
        let p = policy(50, 60_000);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut allowed = 0u64;
                for _ in 0..25 {
                    if store.hit("user:shared", p, 0).await.allowed {
                        allowed += 1;
                    }
                }
                allowed
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 50);
        assert_eq!(store.get("user:shared").await.unwrap().count, 50);
    }
}
