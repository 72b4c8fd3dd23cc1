//! HTTP API of the standalone rate limit service.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{Extensions, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::response::{apply_quota_headers, denial_response};
use crate::ratelimit::{ClientKey, RateLimiter};

/// Shared state of the HTTP service.
#[derive(Clone)]
pub struct RateLimitService {
    limiter: Arc<RateLimiter>,
    cors: HeaderMap,
}

impl RateLimitService {
    pub fn new(limiter: Arc<RateLimiter>, cors: HeaderMap) -> Self {
        Self { limiter, cors }
    }

    /// Build the router for this service.
    pub fn router(self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/v1/policies", get(list_policies))
            .route("/v1/ratelimit/check", post(check))
            .route("/v1/ratelimit/{identifier}", delete(reset))
            .with_state(self)
    }
}

/// Body of a check request.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Policy name to count against
    pub policy: String,
    /// Explicit identifier; derived from the request when absent
    #[serde(default)]
    pub identifier: Option<String>,
    /// Authenticated user id resolved by the caller
    #[serde(default)]
    pub user_id: Option<String>,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn list_policies(State(service): State<RateLimitService>) -> Response {
    (service.cors.clone(), Json(service.limiter.policies().clone())).into_response()
}

/// Count one request and report the decision.
#[instrument(skip_all, fields(policy = %request.policy))]
async fn check(
    State(service): State<RateLimitService>,
    extensions: Extensions,
    headers: HeaderMap,
    Json(request): Json<CheckRequest>,
) -> Response {
    if request.policy.trim().is_empty() {
        warn!("Received rate limit check with empty policy");
        return (
            StatusCode::BAD_REQUEST,
            service.cors.clone(),
            Json(serde_json::json!({ "error": "policy is required" })),
        )
            .into_response();
    }

    if !service.limiter.has_policy(&request.policy) {
        warn!("Received rate limit check for unknown policy");
        return (
            StatusCode::BAD_REQUEST,
            service.cors.clone(),
            Json(serde_json::json!({ "error": format!("unknown policy '{}'", request.policy) })),
        )
            .into_response();
    }

    let identifier = match request.identifier.as_deref().map(str::trim) {
        Some(identifier) if !identifier.is_empty() => identifier.to_string(),
        _ => ClientKey::derive(
            &headers,
            request.user_id.as_deref(),
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
        )
        .to_string(),
    };

    let decision = service.limiter.check(&identifier, &request.policy).await;
    if !decision.allowed {
        warn!(identifier = %identifier, "Rate limit exceeded");
        return denial_response(decision.reset_at_ms, &service.cors);
    }

    debug!(
        identifier = %identifier,
        remaining = decision.remaining,
        "Rate limit check passed"
    );
    let mut response_headers = service.cors.clone();
    apply_quota_headers(&mut response_headers, &decision);
    (response_headers, Json(decision)).into_response()
}

/// Administrative override: clear an identifier's quota.
///
/// Unauthenticated. The service trusts every client that can reach it, so it
/// must only be exposed to trusted callers, e.g. bound to loopback as a sidecar.
async fn reset(
    State(service): State<RateLimitService>,
    Path(identifier): Path<String>,
) -> Response {
    service.limiter.reset(&identifier).await;
    info!(identifier = %identifier, "Reset requested");
    (StatusCode::NO_CONTENT, service.cors.clone()).into_response()
}
