//! Rate limiting middleware for Tollgate
//!
//! Runs the role-aware [`RateLimiter`](crate::services::RateLimiter) for
//! every routed request and attaches the `X-RateLimit-*` headers to the
//! response, rejections included. Needs the [`RequestIdentity`] put in
//! place by `resolve_identity`.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::warn;

use crate::error::ApiError;
use crate::middleware::auth::{route_path, RequestIdentity};
use crate::models::RateLimitMetadata;
use crate::routes::AppState;
use crate::services::{RateLimitDecision, RateLimitRequest};

/// Count the request against its tier and reject past the limit
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let identity = request
        .extensions()
        .get::<RequestIdentity>()
        .cloned()
        .unwrap_or_else(|| RequestIdentity::anonymous("unknown"));
    let identifier = identity.identifier();
    let method = request.method().as_str().to_owned();
    let path = route_path(&request).to_owned();

    let limit_request = RateLimitRequest {
        method: &method,
        path: &path,
        role: identity.role(),
        identifier: &identifier,
    };
    let decision = state.limiter.check(&limit_request, Utc::now()).await;

    match decision {
        Ok(RateLimitDecision::Unlimited) => next.run(request).await,
        Ok(RateLimitDecision::Allowed(metadata)) => {
            let mut response = next.run(request).await;
            apply_headers(response.headers_mut(), &metadata);
            response
        }
        Ok(RateLimitDecision::Limited {
            metadata,
            rejection,
        }) => {
            let mut response = ApiError::RateLimited(rejection).into_response();
            apply_headers(response.headers_mut(), &metadata);
            response
        }
        Err(e) => e.into_response(),
    }
}

const RATE_LIMIT_HEADERS: [&str; 6] = [
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
    "x-ratelimit-reset",
    "x-ratelimit-window",
    "x-ratelimit-role",
    "x-ratelimit-endpoint",
];

/// Response headers cross-origin callers may read
pub fn exposed_headers() -> Vec<HeaderName> {
    std::iter::once(header::RETRY_AFTER)
        .chain(RATE_LIMIT_HEADERS.into_iter().map(HeaderName::from_static))
        .collect()
}

/// Write `X-RateLimit-*` headers
pub fn apply_headers(headers: &mut HeaderMap, metadata: &RateLimitMetadata) {
    for (name, value) in metadata.header_pairs() {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = name, "Skipping unencodable rate limit header"),
        }
    }
}

/// Peers allowed to report the client address in forwarding headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    addrs: Vec<IpAddr>,
}

impl TrustedProxies {
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addrs: addrs.into_iter().collect(),
        }
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.addrs.contains(ip)
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

impl FromStr for TrustedProxies {
    type Err = String;

    /// Comma separated IP addresses
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<IpAddr>()
                    .map_err(|_| format!("invalid proxy address '{}'", part))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

/// Client IP for rate limiting
///
/// The socket peer is the client unless it is a trusted proxy, in which
/// case the first `X-Forwarded-For` entry (then `X-Real-IP`) is used.
pub fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trusted: &TrustedProxies,
) -> String {
    let Some(peer) = connect_info.map(|info| info.0.ip()) else {
        warn!("Could not determine client IP for rate limiting");
        return "unknown".to_string();
    };

    if !trusted.contains(&peer) {
        return peer.to_string();
    }

    // X-Forwarded-For can contain multiple IPs, take the first (client IP)
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| ip.parse::<IpAddr>().is_ok())
    {
        return ip.to_string();
    }

    // X-Real-IP (nginx)
    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|ip| ip.parse::<IpAddr>().is_ok())
    {
        return ip.to_string();
    }

    peer.to_string()
}
