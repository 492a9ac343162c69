//! Redis-backed counter store
//!
//! Used when several instances must share one budget per client. Each
//! window gets its own key (`academia:ratelimit:<class>:<ip>:<window_start>`)
//! so rollover is implicit, and the increment-plus-expire runs as one Lua
//! script, which Redis executes atomically.

use super::{RateDecision, RateLimitStore, WindowRule};
use crate::error::Result;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};

const KEY_PREFIX: &str = "academia:ratelimit";

pub struct RedisRateLimitStore {
    conn: ConnectionManager,
}

impl RedisRateLimitStore {
    /// Connect to Redis and build the store
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn window_key(key: &str, window_start: u64) -> String {
        format!("{}:{}:{}", KEY_PREFIX, key, window_start)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &str,
        rule: &WindowRule,
        now_secs: u64,
    ) -> Result<RateDecision> {
        let window_start = rule.window_start(now_secs);
        let redis_key = Self::window_key(key, window_start);

        // INCR and EXPIRE must land together, otherwise a crash between the
        // two leaves a counter that never expires.
        let script = Script::new(
            r#"
            local count = redis.call('INCR', KEYS[1])
            if count == 1 then
                redis.call('EXPIRE', KEYS[1], ARGV[1])
            end
            return count
            "#,
        );

        let mut conn = self.conn.clone();
        let count: u64 = script
            .key(&redis_key)
            // Keep the key one extra window around for debugging straggler clients
            .arg(rule.window_secs * 2)
            .invoke_async(&mut conn)
            .await?;

        Ok(RateDecision {
            allowed: count < rule.limit,
            remaining: rule.limit.saturating_sub(1).saturating_sub(count),
            reset_at: window_start + rule.window_secs,
        })
    }
}
