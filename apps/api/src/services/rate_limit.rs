//! Role-aware rate limiter
//!
//! Each request is keyed by caller, role, endpoint and time bucket. The
//! policy table decides the window and allowance per (endpoint, role);
//! pairs without a tier pass unlimited.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::{RateLimitMetadata, RateLimitRejection, RateLimitTier, UserRole};
use crate::repositories::CounterStore;

/// Prefix of every counter key
pub const TRACKING_KEY_PREFIX: &str = "auth_rate_limit";

const MINUTE_MS: i64 = 60_000;

/// Longest window a policy file may configure (30 days)
pub const MAX_TIER_TTL_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// `METHOD:/path` with the method upper-cased and trailing slashes stripped
pub fn endpoint_key(method: &str, path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    let path = if trimmed.is_empty() { "/" } else { trimmed };
    format!("{}:{}", method.trim().to_uppercase(), path)
}

/// Re-normalize an already joined `METHOD:/path` key
fn normalize_endpoint(key: &str) -> String {
    match key.split_once(':') {
        Some((method, path)) => endpoint_key(method, path),
        None => key.to_string(),
    }
}

/// Tiers keyed by endpoint, then role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTable {
    tiers: HashMap<String, HashMap<UserRole, RateLimitTier>>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits for the `/api/auth` endpoints
    pub fn default_auth() -> Self {
        let mut table = Self::new();
        for (endpoint, admin, user) in [
            (
                "POST:/api/auth/register",
                RateLimitTier::new(300_000, 50),
                RateLimitTier::new(3_600_000, 5),
            ),
            (
                "POST:/api/auth/login",
                RateLimitTier::new(300_000, 100),
                RateLimitTier::new(300_000, 20),
            ),
            (
                "POST:/api/auth/refresh",
                RateLimitTier::new(300_000, 200),
                RateLimitTier::new(300_000, 60),
            ),
            (
                "POST:/api/auth/logout",
                RateLimitTier::new(60_000, 50),
                RateLimitTier::new(60_000, 20),
            ),
            (
                "GET:/api/auth/profile",
                RateLimitTier::new(60_000, 200),
                RateLimitTier::new(60_000, 60),
            ),
        ] {
            table.insert(endpoint, UserRole::Admin, admin);
            table.insert(endpoint, UserRole::User, user);
        }
        table
    }

    /// Load a table from JSON: `{"POST:/path": {"user": {"ttl": 60000, "limit": 5}}}`
    pub fn from_json_file(path: impl AsRef<Path>) -> ApiResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ApiError::Configuration(format!(
                "cannot read rate limit policy {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> ApiResult<Self> {
        let parsed: PolicyTable = serde_json::from_str(raw)
            .map_err(|e| ApiError::Configuration(format!("invalid rate limit policy: {}", e)))?;

        let mut table = Self::new();
        for (endpoint, roles) in parsed.tiers {
            for (role, tier) in roles {
                if tier.ttl == 0 {
                    return Err(ApiError::Configuration(format!(
                        "rate limit ttl for {} ({}) must be positive",
                        endpoint, role
                    )));
                }
                if tier.ttl > MAX_TIER_TTL_MS {
                    return Err(ApiError::Configuration(format!(
                        "rate limit ttl for {} ({}) exceeds {} ms",
                        endpoint, role, MAX_TIER_TTL_MS
                    )));
                }
                table.insert(&endpoint, role, tier);
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, endpoint: &str, role: UserRole, tier: RateLimitTier) {
        self.tiers
            .entry(normalize_endpoint(endpoint))
            .or_default()
            .insert(role, tier);
    }

    pub fn tier(&self, endpoint: &str, role: UserRole) -> Option<RateLimitTier> {
        self.tiers.get(endpoint)?.get(&role).copied()
    }

    /// Endpoints with at least one tier, sorted
    pub fn endpoints(&self) -> Vec<&str> {
        let mut endpoints: Vec<&str> = self.tiers.keys().map(String::as_str).collect();
        endpoints.sort_unstable();
        endpoints
    }
}

/// How the time bucket in the tracking key is derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BucketStrategy {
    /// `floor(now / 60s)` regardless of the tier window
    #[default]
    FixedMinute,
    /// `floor(now / tier.ttl)`, one bucket per window
    TierWindow,
}

impl BucketStrategy {
    pub fn bucket(&self, now: DateTime<Utc>, tier: &RateLimitTier) -> i64 {
        let width = match self {
            Self::FixedMinute => MINUTE_MS,
            Self::TierWindow => i64::try_from(tier.ttl).unwrap_or(i64::MAX).max(1),
        };
        now.timestamp_millis().div_euclid(width)
    }
}

impl FromStr for BucketStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minute" => Ok(Self::FixedMinute),
            "window" => Ok(Self::TierWindow),
            other => Err(format!("unknown bucket strategy '{}'", other)),
        }
    }
}

/// Request facts the limiter needs
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRequest<'a> {
    pub method: &'a str,
    /// Route path (matched pattern when available)
    pub path: &'a str,
    pub role: UserRole,
    /// Authenticated user id, else the client address
    pub identifier: &'a str,
}

/// Outcome of a single check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// No tier for this (endpoint, role)
    Unlimited,
    Allowed(RateLimitMetadata),
    Limited {
        metadata: RateLimitMetadata,
        rejection: Box<RateLimitRejection>,
    },
}

impl RateLimitDecision {
    pub fn metadata(&self) -> Option<&RateLimitMetadata> {
        match self {
            Self::Unlimited => None,
            Self::Allowed(metadata) | Self::Limited { metadata, .. } => Some(metadata),
        }
    }

    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    policy: Arc<PolicyTable>,
    store: Arc<dyn CounterStore>,
    bucket: BucketStrategy,
}

impl RateLimiter {
    pub fn new(policy: PolicyTable, store: Arc<dyn CounterStore>, bucket: BucketStrategy) -> Self {
        Self {
            policy: Arc::new(policy),
            store,
            bucket,
        }
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// `auth_rate_limit:{identifier}:{role}:{endpoint}:{bucket}`
    pub fn tracking_key(
        &self,
        request: &RateLimitRequest<'_>,
        endpoint: &str,
        tier: &RateLimitTier,
        now: DateTime<Utc>,
    ) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            TRACKING_KEY_PREFIX,
            request.identifier,
            request.role,
            endpoint,
            self.bucket.bucket(now, tier)
        )
    }

    /// Count one hit and decide. Counter store errors are returned as-is.
    pub async fn check(
        &self,
        request: &RateLimitRequest<'_>,
        now: DateTime<Utc>,
    ) -> ApiResult<RateLimitDecision> {
        let endpoint = endpoint_key(request.method, request.path);
        let Some(tier) = self.policy.tier(&endpoint, request.role) else {
            return Ok(RateLimitDecision::Unlimited);
        };

        let key = self.tracking_key(request, &endpoint, &tier, now);
        let hit = self.store.increment_with_expiry(&key, tier.ttl).await?;

        let limit = u64::from(tier.limit);
        let remaining = limit.saturating_sub(hit.count) as u32;
        let reset_at = i64::try_from(hit.remaining_ttl_ms)
            .ok()
            .and_then(|ms| now.checked_add_signed(chrono::Duration::milliseconds(ms)))
            .ok_or_else(|| {
                ApiError::Internal(format!(
                    "counter ttl {} ms for {} is out of range",
                    hit.remaining_ttl_ms, endpoint
                ))
            })?;
        let metadata = RateLimitMetadata {
            limit: tier.limit,
            remaining,
            reset_at,
            window_secs: tier.window_secs(),
            role: request.role,
            endpoint: endpoint.clone(),
        };

        if hit.count <= limit {
            return Ok(RateLimitDecision::Allowed(metadata));
        }

        tracing::warn!(
            identifier = %request.identifier,
            role = %request.role,
            endpoint = %endpoint,
            hits = hit.count,
            limit = tier.limit,
            "Rate limit exceeded"
        );

        let rejection = RateLimitRejection {
            role: request.role,
            endpoint,
            limit: tier.limit,
            window_secs: tier.window_secs(),
            retry_after_secs: hit.remaining_ttl_ms.div_ceil(1000),
            reset_at,
        };
        Ok(RateLimitDecision::Limited {
            metadata,
            rejection: Box::new(rejection),
        })
    }
}
