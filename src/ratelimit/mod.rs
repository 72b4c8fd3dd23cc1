//! Rate limiting logic and state management.

mod entry;
mod identity;
mod limiter;
mod policy;
mod store;
mod sweeper;

pub use entry::{apply_hit, timestamp_from_ms, Decision, RateLimitEntry};
pub use identity::{derive_identifier, ClientKey, X_FORWARDED_FOR, X_REAL_IP};
pub use limiter::RateLimiter;
pub use policy::{Policy, PolicyTable, AI_CHAT, DEFAULT, FILE_UPLOAD, SEARCH, SECURITY_SCAN};
pub use store::{MemoryStore, RateLimitStore};
pub use sweeper::{SweeperHandle, DEFAULT_SWEEP_INTERVAL};

pub(crate) use limiter::now_ms;
