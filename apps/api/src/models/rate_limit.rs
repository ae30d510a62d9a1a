//! Rate limit tiers and the metadata emitted for each limited request

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::user::UserRole;

/// Window and allowance for one (endpoint, role) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitTier {
    /// Counter expiry in milliseconds
    pub ttl: u64,
    /// Hits allowed before rejection
    pub limit: u32,
}

impl RateLimitTier {
    pub const fn new(ttl: u64, limit: u32) -> Self {
        Self { ttl, limit }
    }

    pub fn window_secs(&self) -> u64 {
        self.ttl / 1000
    }
}

/// Values reported to the client on every limited request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitMetadata {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub window_secs: u64,
    pub role: UserRole,
    pub endpoint: String,
}

impl RateLimitMetadata {
    /// Header name/value pairs (`X-RateLimit-*`)
    pub fn header_pairs(&self) -> [(&'static str, String); 6] {
        [
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", iso_timestamp(&self.reset_at)),
            ("X-RateLimit-Window", self.window_secs.to_string()),
            ("X-RateLimit-Role", self.role.to_string()),
            ("X-RateLimit-Endpoint", self.endpoint.clone()),
        ]
    }
}

/// Details attached to a "too many requests" rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRejection {
    pub role: UserRole,
    pub endpoint: String,
    pub limit: u32,
    #[serde(rename = "windowSeconds")]
    pub window_secs: u64,
    #[serde(rename = "retryAfter")]
    pub retry_after_secs: u64,
    #[serde(serialize_with = "serialize_iso")]
    pub reset_at: DateTime<Utc>,
}

/// ISO-8601 with millisecond precision and a `Z` suffix
pub fn iso_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_iso<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_timestamp(at))
}
