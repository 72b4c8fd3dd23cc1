//! Caller identification for rate limit buckets.

use axum::http::HeaderMap;
use std::fmt;
use std::net::IpAddr;

/// Header carrying the proxy chain, client first.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Header carrying the client address as seen by the edge proxy.
pub const X_REAL_IP: &str = "x-real-ip";

/// The bucket a request is counted against.
///
/// Authenticated identity is preferred over network address, which is
/// preferred over the shared anonymous bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    User(String),
    Ip(String),
    Anonymous,
}

impl ClientKey {
    /// Resolve the key for a request.
    ///
    /// `peer` is the transport-level source address, consulted only when
    /// neither address header is present.
    pub fn derive(headers: &HeaderMap, user_id: Option<&str>, peer: Option<IpAddr>) -> Self {
        if let Some(user_id) = user_id.map(str::trim).filter(|id| !id.is_empty()) {
            return ClientKey::User(user_id.to_string());
        }

        if let Some(addr) = header_value(headers, X_FORWARDED_FOR)
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
        {
            return ClientKey::Ip(addr.to_string());
        }

        if let Some(addr) = header_value(headers, X_REAL_IP)
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
        {
            return ClientKey::Ip(addr.to_string());
        }

        match peer {
            Some(ip) => ClientKey::Ip(ip.to_string()),
            None => ClientKey::Anonymous,
        }
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKey::User(id) => write!(f, "user:{}", id),
            ClientKey::Ip(addr) => write!(f, "ip:{}", addr),
            ClientKey::Anonymous => f.write_str("anonymous"),
        }
    }
}

/// Derive the rate limit identifier from request headers and an optional user id.
pub fn derive_identifier(headers: &HeaderMap, user_id: Option<&str>) -> String {
    ClientKey::derive(headers, user_id, None).to_string()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
