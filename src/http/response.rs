//! Standard rate limit response construction.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, RETRY_AFTER,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::CorsConfig;
use crate::ratelimit::{now_ms, timestamp_from_ms, Decision};

pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// JSON body of a 429 response.
#[derive(Debug, Serialize)]
struct DenialBody {
    error: &'static str,
    message: String,
    #[serde(rename = "retryAfter")]
    retry_after: u64,
}

/// Whole seconds until `reset_at_ms`, rounded up and never negative.
pub fn retry_after_secs(reset_at_ms: i64, now_ms: i64) -> u64 {
    let remaining_ms = reset_at_ms.saturating_sub(now_ms).max(0) as u64;
    remaining_ms.div_ceil(1000)
}

/// Render epoch milliseconds as an ISO-8601 UTC timestamp.
pub fn iso_timestamp(epoch_ms: i64) -> String {
    format_timestamp(timestamp_from_ms(epoch_ms))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the 429 response for a denied request.
pub fn denial_response(reset_at_ms: i64, cors: &HeaderMap) -> Response {
    denial_response_at(reset_at_ms, now_ms(), cors)
}

/// Build the 429 response as of `now_ms`.
pub fn denial_response_at(reset_at_ms: i64, now_ms: i64, cors: &HeaderMap) -> Response {
    let retry_after = retry_after_secs(reset_at_ms, now_ms);
    let body = DenialBody {
        error: "Rate limit exceeded",
        message: format!(
            "Too many requests. Please try again in {} seconds.",
            retry_after
        ),
        retry_after,
    };

    let mut headers = cors.clone();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    insert_reset_header(&mut headers, timestamp_from_ms(reset_at_ms));

    let body = match serde_json::to_string(&body) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to serialize rate limit body");
            String::new()
        }
    };

    (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response()
}

/// Advertise the remaining quota on an allowed response.
pub fn apply_quota_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    insert_reset_header(headers, decision.reset_at());
}

/// The CORS headers attached to every response.
pub fn cors_headers(config: &CorsConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        (ACCESS_CONTROL_ALLOW_ORIGIN, &config.allow_origin),
        (ACCESS_CONTROL_ALLOW_HEADERS, &config.allow_headers),
    ] {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => warn!(header = %name, value = %value, "Ignoring invalid CORS header value"),
        }
    }
    headers
}

fn insert_reset_header(headers: &mut HeaderMap, reset_at: DateTime<Utc>) {
    // RFC 3339 output is always valid ASCII
    if let Ok(value) = HeaderValue::from_str(&format_timestamp(reset_at)) {
        headers.insert(X_RATELIMIT_RESET, value);
    }
}
