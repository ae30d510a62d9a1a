//! Counter stores for rate limiting
//!
//! A counter store hands out atomic increment-with-expiry: the first hit on
//! a key starts its expiry clock, later hits only bump the count. Redis is
//! the shared backend; the in-memory store is per-instance and doubles as
//! the optional fallback when Redis is unreachable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

/// Result of one increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterHit {
    /// Hits recorded under the key, this one included
    pub count: u64,
    /// Milliseconds until the key expires
    pub remaining_ttl_ms: u64,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key`, setting `ttl_ms` expiry on the first hit
    async fn increment_with_expiry(&self, key: &str, ttl_ms: u64) -> ApiResult<CounterHit>;
}

/// INCR, then PEXPIRE on the first hit, then PTTL, as one atomic script.
/// A key left without expiry (PTTL < 0) gets one so it cannot stick forever.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

/// Shared counter store backed by Redis
#[derive(Clone)]
pub struct RedisCounterStore {
    redis: Arc<redis::Client>,
    script: Arc<redis::Script>,
}

impl RedisCounterStore {
    pub fn new(redis: redis::Client) -> Self {
        Self {
            redis: Arc::new(redis),
            script: Arc::new(redis::Script::new(INCREMENT_SCRIPT)),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_with_expiry(&self, key: &str, ttl_ms: u64) -> ApiResult<CounterHit> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let (count, ttl): (i64, i64) = self
            .script
            .key(key)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;

        debug!(key = %key, count, ttl_ms = ttl, "Counter incremented");
        Ok(CounterHit {
            count: count.max(0) as u64,
            remaining_ttl_ms: ttl.max(0) as u64,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

/// Per-instance counter store
///
/// Each key is updated under its dashmap shard lock, so concurrent hits on
/// one key never lose increments.
#[derive(Debug)]
pub struct InMemoryCounterStore {
    entries: DashMap<String, CounterEntry>,
    cleanup_interval: Duration,
    last_cleanup: RwLock<Instant>,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            cleanup_interval: Duration::from_secs(60),
            last_cleanup: RwLock::new(Instant::now()),
        }
    }

    /// Number of live or not-yet-collected keys
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Drop expired keys, at most once per cleanup interval
    async fn maybe_cleanup(&self) {
        {
            let last_cleanup = self.last_cleanup.read().await;
            if last_cleanup.elapsed() < self.cleanup_interval {
                return;
            }
        }

        let mut last_cleanup = self.last_cleanup.write().await;
        if last_cleanup.elapsed() < self.cleanup_interval {
            return;
        }
        *last_cleanup = Instant::now();
        drop(last_cleanup);

        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);

        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(
                removed,
                remaining = self.entries.len(),
                "Cleaned up expired rate limit counters"
            );
        }
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_with_expiry(&self, key: &str, ttl_ms: u64) -> ApiResult<CounterHit> {
        self.maybe_cleanup().await;

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_millis(ttl_ms))
            .ok_or_else(|| {
                ApiError::Internal(format!("counter ttl {} ms out of range", ttl_ms))
            })?;

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(CounterEntry {
                count: 0,
                expires_at,
            });

        if entry.expires_at <= now {
            *entry = CounterEntry {
                count: 0,
                expires_at,
            };
        }
        entry.count += 1;

        Ok(CounterHit {
            count: entry.count,
            remaining_ttl_ms: entry.expires_at.saturating_duration_since(now).as_millis() as u64,
        })
    }
}

/// Primary store with a per-instance fallback on errors
///
/// Off unless configured: by default store errors reach the caller.
pub struct FallbackCounterStore {
    primary: Arc<dyn CounterStore>,
    fallback: InMemoryCounterStore,
}

impl FallbackCounterStore {
    pub fn new(primary: Arc<dyn CounterStore>) -> Self {
        Self {
            primary,
            fallback: InMemoryCounterStore::new(),
        }
    }
}

#[async_trait]
impl CounterStore for FallbackCounterStore {
    async fn increment_with_expiry(&self, key: &str, ttl_ms: u64) -> ApiResult<CounterHit> {
        match self.primary.increment_with_expiry(key, ttl_ms).await {
            Ok(hit) => Ok(hit),
            Err(e) => {
                warn!(
                    error = %e,
                    key = %key,
                    "Counter store unavailable, using in-memory fallback"
                );
                self.fallback.increment_with_expiry(key, ttl_ms).await
            }
        }
    }
}
