//! HTTP integration: response helpers, route middleware and the service API.

mod middleware;
mod response;
mod server;
mod service;

pub use middleware::{rate_limit_middleware, AuthenticatedUser, RateLimitGuard};
pub use response::{
    apply_quota_headers, cors_headers, denial_response, denial_response_at, iso_timestamp,
    retry_after_secs, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use server::HttpServer;
pub use service::{CheckRequest, RateLimitService};
