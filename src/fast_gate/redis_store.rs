//! Redis-backed sliding-window store shared by every node.
//!
//! The whole prune/count/record step runs as one Lua script so concurrent
//! requests for the same IP cannot both observe `count < limit`. Keys carry a
//! `PEXPIRE` of one window, so idle IPs are evicted by Redis itself.
//!
//! The connection is a `ConnectionManager`: a dropped socket fails the
//! in-flight call (the gate fails open for it) and the manager reconnects
//! for the calls that follow.

use std::time::Duration;

use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{FastGateError, WindowHit, WindowStore, window_ms};

const SLIDING_WINDOW_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
local allowed = 0
if count < limit then
    redis.call('ZADD', key, now, member)
    count = count + 1
    allowed = 1
end
if count > 0 then
    redis.call('PEXPIRE', key, window)
end

local reset = now + window
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
    reset = tonumber(oldest[2]) + window
end
return {allowed, count, reset}
";

pub struct RedisWindowStore {
    client: redis::Client,
    /// Established on first use so startup does not depend on Redis being up.
    conn: OnceCell<ConnectionManager>,
    script: redis::Script,
}

impl RedisWindowStore {
    /// # Errors
    ///
    /// Returns an error if the URL is not a valid Redis connection string.
    pub fn open(url: &str) -> Result<Self, FastGateError> {
        let client = redis::Client::open(url)?;
        Ok(Self { client, conn: OnceCell::new(), script: redis::Script::new(SLIDING_WINDOW_SCRIPT) })
    }

    async fn connection(&self) -> Result<ConnectionManager, FastGateError> {
        let conn = self
            .conn
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait::async_trait]
impl WindowStore for RedisWindowStore {
    async fn hit(&self, key: &str, limit: u32, window: Duration, now_ms: i64) -> Result<WindowHit, FastGateError> {
        let mut conn = self.connection().await?;
        let member = format!("{now_ms}-{}", Uuid::new_v4().simple());

        let (allowed, count, reset_at_ms): (i64, i64, i64) = self
            .script
            .key(key)
            .arg(now_ms)
            .arg(window_ms(window))
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowHit {
            allowed: allowed == 1,
            count: u32::try_from(count).unwrap_or(u32::MAX),
            reset_at_ms,
        })
    }
}

#[cfg(test)]
#[path = "redis_store_test.rs"]
mod tests;
