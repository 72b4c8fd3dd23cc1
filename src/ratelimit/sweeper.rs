//! Background sweep of expired entries.
//!
//! Lazy expiry on `check` only reclaims entries that are queried again. The
//! sweeper bounds memory for callers that go quiet mid-window.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to a running sweeper task.
///
/// Dropping the handle aborts the task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl RateLimiter {
    /// Start sweeping expired entries every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let limiter = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            info!(interval_ms = interval.as_millis() as u64, "Rate limit sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep().await;
                        debug!(removed_entries = removed, "Sweep tick");
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("Rate limit sweeper stopped");
        });

        SweeperHandle {
            shutdown,
            task: Some(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::Policy;

    #[tokio::test]
    async fn test_sweeper_reclaims_expired_entries() {
        let limiter = Arc::new(RateLimiter::new());
        let short = Policy::new(5, 20).unwrap();
        let long = Policy::new(5, 3_600_000).unwrap();

        limiter.check_with("ip:10.0.0.1", short).await;
        limiter.check_with("user:alice", long).await;
        assert_eq!(limiter.active_entries().await, 2);

        let handle = limiter.spawn_sweeper(Duration::from_millis(25));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(limiter.active_entries().await, 1);
        assert_eq!(limiter.entry("user:alice").await.unwrap().count, 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_ends_task() {
        let limiter = Arc::new(RateLimiter::new());
        let handle = limiter.spawn_sweeper(DEFAULT_SWEEP_INTERVAL);
        assert!(handle.is_running());

        handle.stop().await;
        // The task held the only other reference
        assert_eq!(Arc::strong_count(&limiter), 1);
    }

    #[tokio::test]
    async fn test_drop_aborts_task() {
        let limiter = Arc::new(RateLimiter::new());
        let handle = limiter.spawn_sweeper(DEFAULT_SWEEP_INTERVAL);
        drop(handle);

        for _ in 0..50 {
            if Arc::strong_count(&limiter) == 1 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("sweeper task still holds the limiter");
    }
}
