//! Fast cache abstraction
//!
//! Every operation the engine and the reconciliation job need from the key-value
//! store. Concurrency correctness relies on these primitives being atomic on the
//! server side; callers never read-modify-write a counter.

pub mod keys;
mod redis_cache;

pub use redis_cache::RedisFastCache;

use crate::error::CacheResult;
use std::time::Duration;

/// Outcome of recording one hit in a sliding window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Whether the hit fit in the window (and was recorded)
    pub allowed: bool,
    /// Hits inside the window after this call
    pub count: u32,
    /// Milliseconds until the oldest hit leaves the window, 0 when allowed
    pub retry_after_ms: u64,
}

#[async_trait::async_trait]
pub trait FastCache: Send + Sync {
    /// Round-trip health check
    async fn ping(&self) -> CacheResult<()>;

    /// SISMEMBER
    async fn is_member(&self, set_key: &str, member: &str) -> CacheResult<bool>;

    /// SADD, returns true when the member was newly added
    async fn add_member(&self, set_key: &str, member: &str) -> CacheResult<bool>;

    /// SREM, returns true when the member was present
    async fn remove_member(&self, set_key: &str, member: &str) -> CacheResult<bool>;

    /// SET key value EX ttl
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// DEL
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// INCRBY, creating the key at 0 when missing
    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// EXPIRE
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()>;

    /// EXPIRE over many keys in one round trip
    async fn expire_many(&self, keys: &[String], ttl: Duration) -> CacheResult<()>;

    /// GET parsed as an integer counter
    async fn get_counter(&self, key: &str) -> CacheResult<Option<i64>>;

    /// MGET parsed as integer counters, one slot per requested key
    async fn get_counters(&self, keys: &[String]) -> CacheResult<Vec<Option<i64>>>;

    /// One SCAN page. A returned cursor of 0 means the iteration is complete.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize)
        -> CacheResult<(u64, Vec<String>)>;

    /// Atomically drop hits older than `window`, then record a hit at `now_ms`
    /// unless `limit` hits are already inside the window.
    async fn hit_sliding_window(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u32,
    ) -> CacheResult<WindowHit>;

    /// Broadcast a message on a pub/sub channel, returns the number of receivers
    async fn publish(&self, channel: &str, payload: &str) -> CacheResult<u64>;
}
