use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use deadpool_redis::Pool;
use deadpool_redis::redis;

use crate::domain::repository::RateLimiter;
use crate::domain::types::RateLimitDecision;
use crate::error::GatewayError;

/// Evict, count, insert and expire as one server-side step. Returns the
/// number of entries in the window before this hit.
const SLIDING_WINDOW: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
local count = redis.call('ZCARD', key)
redis.call('ZADD', key, now, ARGV[3])
redis.call('PEXPIRE', key, window)
return count
"#;

fn limiter_key(key: &str) -> String {
    format!("ratelimit:{key}")
}

// ── Redis ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RedisRateLimiter {
    pub pool: Pool,
}

impl RateLimiter for RedisRateLimiter {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, GatewayError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        let now_ms = Utc::now().timestamp_millis();
        let member = format!("{now_ms}:{}", rand::random::<u32>());
        let count: u64 = redis::cmd("EVAL")
            .arg(SLIDING_WINDOW)
            .arg(1)
            .arg(limiter_key(key))
            .arg(now_ms)
            .arg(window.as_millis() as u64)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| GatewayError::Internal(e.into()))?;
        Ok(RateLimitDecision::evaluate(count, limit, now_ms, window))
    }
}

// ── In-process ───────────────────────────────────────────────────────────────

/// Keys tracked before stale windows are swept.
const LOCAL_SWEEP_THRESHOLD: usize = 10_000;

/// Same window semantics as [`RedisRateLimiter`], counted in this process only.
#[derive(Clone, Default)]
pub struct LocalRateLimiter {
    windows: Arc<Mutex<HashMap<String, VecDeque<i64>>>>,
}

impl LocalRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// One hit at an explicit time.
    pub fn hit_at(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> RateLimitDecision {
        let window_ms = window.as_millis() as i64;
        let cutoff = now_ms - window_ms;
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if windows.len() > LOCAL_SWEEP_THRESHOLD {
            windows.retain(|_, hits| hits.back().is_some_and(|&last| last > cutoff));
        }
        let hits = windows.entry(limiter_key(key)).or_default();
        while hits.front().is_some_and(|&t| t <= cutoff) {
            hits.pop_front();
        }
        let count = hits.len() as u64;
        hits.push_back(now_ms);
        RateLimitDecision::evaluate(count, limit, now_ms, window)
    }
}

impl RateLimiter for LocalRateLimiter {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, GatewayError> {
        Ok(self.hit_at(key, limit, window, Utc::now().timestamp_millis()))
    }
}

// ── Backend selection ────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum RateLimiterBackend {
    Redis(RedisRateLimiter),
    Local(LocalRateLimiter),
}

impl RateLimiter for RateLimiterBackend {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, GatewayError> {
        match self {
            Self::Redis(limiter) => limiter.hit(key, limit, window).await,
            Self::Local(limiter) => limiter.hit(key, limit, window).await,
        }
    }
}
