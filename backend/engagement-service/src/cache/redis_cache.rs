use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;

use super::{FastCache, WindowHit};
use crate::error::{CacheError, CacheResult};

/// Sliding window over a sorted set of hit timestamps.
///
/// KEYS[1] window key; ARGV: now_ms, window_ms, limit, unique member.
/// Returns {allowed, count, oldest_ms}.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count >= limit then
  local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
  local oldest_ms = now
  if oldest[2] then
    oldest_ms = tonumber(oldest[2])
  end
  return {0, count, oldest_ms}
end
redis.call('ZADD', key, now, ARGV[4])
redis.call('PEXPIRE', key, window)
return {1, count + 1, now}
"#;

/// Redis-backed fast cache.
///
/// `ConnectionManager` is cheap to clone and reconnects on its own, so every call
/// works on a fresh handle instead of holding a lock.
#[derive(Clone)]
pub struct RedisFastCache {
    redis: ConnectionManager,
    sliding_window: redis::Script,
}

impl RedisFastCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            sliding_window: redis::Script::new(SLIDING_WINDOW_SCRIPT),
        }
    }

    fn conn(&self) -> ConnectionManager {
        self.redis.clone()
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Integer counters from raw MGET slots. A value that does not parse is reported as
/// missing so the caller skips that key.
fn parse_counters(keys: &[String], raw: Vec<Option<String>>) -> Vec<Option<i64>> {
    keys.iter()
        .zip(raw)
        .map(|(key, value)| {
            let value = value?;
            match value.trim().parse::<i64>() {
                Ok(count) => Some(count),
                Err(_) => {
                    tracing::warn!(key = %key, value = %value, "Counter key holds a non-integer value");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl FastCache for RedisFastCache {
    async fn ping(&self) -> CacheResult<()> {
        let pong: String = redis::cmd("PING").query_async(&mut self.conn()).await?;
        if pong != "PONG" {
            return Err(CacheError::Protocol(format!("unexpected PING reply: {}", pong)));
        }
        Ok(())
    }

    async fn is_member(&self, set_key: &str, member: &str) -> CacheResult<bool> {
        Ok(self.conn().sismember(set_key, member).await?)
    }

    async fn add_member(&self, set_key: &str, member: &str) -> CacheResult<bool> {
        let added: i64 = self.conn().sadd(set_key, member).await?;
        Ok(added > 0)
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> CacheResult<bool> {
        let removed: i64 = self.conn().srem(set_key, member).await?;
        Ok(removed > 0)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let _: () = self.conn().set_ex(key, value, ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let _: () = self.conn().del(key).await?;
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        Ok(self.conn().incr(key, delta).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let _: () = self.conn().expire(key, ttl_secs(ttl) as i64).await?;
        Ok(())
    }

    async fn expire_many(&self, keys: &[String], ttl: Duration) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.expire(key, ttl_secs(ttl) as i64).ignore();
        }
        pipe.query_async::<_, ()>(&mut self.conn()).await?;
        Ok(())
    }

    async fn get_counter(&self, key: &str) -> CacheResult<Option<i64>> {
        Ok(self.conn().get(key).await?)
    }

    async fn get_counters(&self, keys: &[String]) -> CacheResult<Vec<Option<i64>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        // Explicit MGET so a single-key batch still comes back as an array. Values are
        // read as strings: one non-integer value must not fail the whole batch.
        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async::<_, Vec<Option<String>>>(&mut self.conn())
            .await?;

        if raw.len() != keys.len() {
            return Err(CacheError::Protocol(format!(
                "MGET returned {} values for {} keys",
                raw.len(),
                keys.len()
            )));
        }
        Ok(parse_counters(keys, raw))
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> CacheResult<(u64, Vec<String>)> {
        let page = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async::<_, (u64, Vec<String>)>(&mut self.conn())
            .await?;
        Ok(page)
    }

    async fn hit_sliding_window(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u32,
    ) -> CacheResult<WindowHit> {
        let window_ms = window.as_millis() as i64;
        let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4());

        let reply: Vec<i64> = self
            .sliding_window
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut self.conn())
            .await?;

        let [allowed, count, oldest_ms] = reply[..] else {
            return Err(CacheError::Protocol(format!(
                "sliding window script returned {} values",
                reply.len()
            )));
        };

        let retry_after_ms = if allowed == 1 {
            0
        } else {
            (oldest_ms + window_ms - now_ms).max(0) as u64
        };

        Ok(WindowHit {
            allowed: allowed == 1,
            count: count.max(0) as u32,
            retry_after_ms,
        })
    }

    async fn publish(&self, channel: &str, payload: &str) -> CacheResult<u64> {
        Ok(self.conn().publish(channel, payload).await?)
    }
}
