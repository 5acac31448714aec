use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
pub struct WindowCount {
    pub count: i64,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
    pub retry_after_ms: Option<i64>,
}

/// Per-key fixed-window counter. The increment must be atomic per key so two
/// concurrent requests at the `max_requests` boundary cannot both pass.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn incr(&self, key: &str, window_ms: i64, now: DateTime<Utc>) -> Result<WindowCount>;
}

#[derive(Clone, Default)]
pub struct InMemoryRateLimitStore {
    windows: Arc<Mutex<HashMap<String, WindowCount>>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn incr(&self, key: &str, window_ms: i64, now: DateTime<Utc>) -> Result<WindowCount> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| anyhow::anyhow!("rate limit store lock poisoned"))?;
        let entry = windows.entry(key.to_string()).or_insert(WindowCount {
            count: 0,
            reset_at: now + Duration::milliseconds(window_ms),
        });
        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + Duration::milliseconds(window_ms);
        }
        entry.count += 1;
        Ok(*entry)
    }
}

#[derive(Clone)]
pub struct RedisRateLimitStore {
    pub client: redis::Client,
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn incr(&self, key: &str, window_ms: i64, now: DateTime<Utc>) -> Result<WindowCount> {
        let rkey = format!("rate:{key}");
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: i64 = conn.incr(&rkey, 1).await?;
        if count == 1 {
            let _: bool = conn.pexpire(&rkey, window_ms).await?;
        }
        let ttl: i64 = conn.pttl(&rkey).await?;
        let remaining_ms = if ttl > 0 { ttl } else { window_ms };
        Ok(WindowCount {
            count,
            reset_at: now + Duration::milliseconds(remaining_ms),
        })
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    pub window_ms: i64,
    pub max_requests: i64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, window_ms: i64, max_requests: i64) -> Self {
        Self {
            store,
            window_ms,
            max_requests,
        }
    }

    pub async fn check(&self, identifier: &str, now: DateTime<Utc>) -> Result<RateLimitDecision> {
        let window = self.store.incr(identifier, self.window_ms, now).await?;
        let allowed = window.count <= self.max_requests;
        let retry_after_ms =
            (!allowed).then(|| (window.reset_at - now).num_milliseconds().max(0));
        Ok(RateLimitDecision {
            allowed,
            remaining: (self.max_requests - window.count).max(0),
            reset_at: window.reset_at,
            retry_after_ms,
        })
    }
}
