//! Two-tier cache backing the policy resolver's memoised effective sets and
//! the rate limiter's counters: an in-memory `DashMap` tier in front of
//! Redis. Postgres remains the source of truth; callers fall back to it
//! themselves on a miss.

use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct TieredCache {
    local: Arc<DashMap<String, String>>,
    redis: ConnectionManager,
}

impl TieredCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            local: Arc::new(DashMap::new()),
            redis,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.local.get(key) {
            return serde_json::from_str(entry.value()).ok();
        }

        let mut conn = self.redis.clone();
        if let Ok(Some(v)) = conn.get::<_, Option<String>>(key).await {
            self.local.insert(key.to_string(), v.clone());
            return serde_json::from_str(&v).ok();
        }

        None
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> anyhow::Result<()> {
        let json = serde_json::to_string(value)?;
        self.local.insert(key.to_string(), json.clone());

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, json, ttl_secs).await?;
        Ok(())
    }

    /// Invalidate a key in the local tier only, called in response to a
    /// message on the admin surface's invalidation channel.
    pub fn invalidate_local(&self, key: &str) {
        self.local.remove(key);
    }

    /// Atomic `INCR` + conditional `EXPIRE` in a single round-trip, so a
    /// crash between the two operations can never leave an un-expiring key.
    pub async fn increment(&self, key: &str, window_secs: u64) -> Result<u64, redis::RedisError> {
        let mut conn = self.redis.clone();
        let script = redis::Script::new(
            r#"
            local current = redis.call("INCR", KEYS[1])
            if current == 1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end
            return current
            "#,
        );
        script.key(key).arg(window_secs).invoke_async(&mut conn).await
    }

    /// Read the current value of a counter without incrementing it, used by
    /// the sliding-window blend to read the adjacent (older) bucket.
    pub async fn get_counter(&self, key: &str) -> Result<u64, redis::RedisError> {
        let mut conn = self.redis.clone();
        let val: Option<u64> = conn.get(key).await?;
        Ok(val.unwrap_or(0))
    }
}
