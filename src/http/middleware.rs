//! Axum middleware that guards routes with a named policy.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use super::response::{apply_quota_headers, denial_response};
use crate::error::{QuotaGateError, Result};
use crate::ratelimit::{ClientKey, RateLimiter};

/// Authenticated caller id, inserted as a request extension by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// State for [`rate_limit_middleware`].
///
/// ```ignore
/// let guard = RateLimitGuard::new(limiter, AI_CHAT, cors)?;
/// let app = Router::new()
///     .route("/chat", post(chat))
///     .route_layer(middleware::from_fn_with_state(guard, rate_limit_middleware));
/// ```
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<RateLimiter>,
    policy: Arc<str>,
    cors: HeaderMap,
}

impl RateLimitGuard {
    /// Create a guard for a policy in the limiter's table.
    ///
    /// Fails for names the table does not define, so a misspelled policy is
    /// caught when routes are built rather than counted against the default.
    pub fn new(limiter: Arc<RateLimiter>, policy: &str, cors: HeaderMap) -> Result<Self> {
        if !limiter.has_policy(policy) {
            return Err(QuotaGateError::UnknownPolicy(policy.to_string()));
        }
        Ok(Self {
            limiter,
            policy: Arc::from(policy),
            cors,
        })
    }
}

/// Count the request against the guard's policy.
///
/// Denied requests never reach the inner handler. CORS preflight requests
/// are not counted.
pub async fn rate_limit_middleware(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let user_id = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.0.as_str());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let identifier = ClientKey::derive(request.headers(), user_id, peer).to_string();

    let decision = guard.limiter.check(&identifier, &guard.policy).await;
    if !decision.allowed {
        warn!(
            identifier = %identifier,
            policy = %guard.policy,
            path = %request.uri().path(),
            "Request rejected by rate limit"
        );
        return denial_response(decision.reset_at_ms, &guard.cors);
    }

    let mut response = next.run(request).await;
    apply_quota_headers(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::{X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
    use crate::ratelimit::{Policy, PolicyTable, X_FORWARDED_FOR};
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::post;
    use axum::{middleware, Extension, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const CHAT: &str = "CHAT";

    fn app(limit: u64, calls: Arc<AtomicUsize>) -> (Router, Arc<RateLimiter>) {
        let table = PolicyTable::builtin().with_policy(CHAT, Policy::new(limit, 60_000).unwrap());
        let limiter = Arc::new(RateLimiter::with_policies(table));
        let guard = RateLimitGuard::new(limiter.clone(), CHAT, HeaderMap::new()).unwrap();

        let router = Router::new()
            .route(
                "/chat",
                post(move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        "ok"
                    }
                })
                .options(|| async { "preflight" }),
            )
            .route_layer(middleware::from_fn_with_state(guard, rate_limit_middleware));
        (router, limiter)
    }

    fn chat_request(method: Method) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(method)
            .uri("/chat")
            .header(X_FORWARDED_FOR, "203.0.113.5, 10.0.0.1")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_allowed_response_carries_quota_headers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (app, _) = app(3, calls.clone());

        let response = app.oneshot(chat_request(Method::POST)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "2");
        assert!(response.headers().contains_key(X_RATELIMIT_RESET));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_request_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (app, limiter) = app(2, calls.clone());

        for _ in 0..2 {
            let response = app.clone().oneshot(chat_request(Method::POST)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.clone().oneshot(chat_request(Method::POST)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(limiter.entry("ip:203.0.113.5").await.unwrap().count, 2);
    }

    #[test]
    fn test_guard_rejects_unknown_policy() {
        let limiter = Arc::new(RateLimiter::new());

        match RateLimitGuard::new(limiter.clone(), "AI_CHTA", HeaderMap::new()) {
            Err(QuotaGateError::UnknownPolicy(name)) => assert_eq!(name, "AI_CHTA"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("guard accepted an unknown policy"),
        }
        assert!(RateLimitGuard::new(limiter, crate::ratelimit::AI_CHAT, HeaderMap::new()).is_ok());
    }

    #[tokio::test]
    async fn test_preflight_is_not_counted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (app, limiter) = app(1, calls);

        for _ in 0..3 {
            let response = app.clone().oneshot(chat_request(Method::OPTIONS)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(limiter.active_entries().await, 0);
    }

    #[tokio::test]
    async fn test_authenticated_user_is_bucketed_by_id() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (app, limiter) = app(5, calls);
        let app = app.layer(Extension(AuthenticatedUser("u1".to_string())));

        app.oneshot(chat_request(Method::POST)).await.unwrap();
        assert!(limiter.entry("user:u1").await.is_some());
        assert!(limiter.entry("ip:203.0.113.5").await.is_none());
    }
}
