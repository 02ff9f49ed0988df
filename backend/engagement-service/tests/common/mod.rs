//! In-memory stand-ins for Redis and PostgreSQL used by the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use engagement_service::cache::{FastCache, WindowHit};
use engagement_service::config::EngagementConfig;
use engagement_service::domain::{
    CounterKind, UserId, VideoId, VideoRecord, VideoStatus,
};
use engagement_service::error::{CacheError, CacheResult};
use engagement_service::repository::CounterStore;
use engagement_service::services::{LikeService, PageInvalidator};

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    Window(Vec<i64>),
}

/// Single-threaded model of the Redis commands the service relies on.
/// Keys are kept ordered so SCAN pages are deterministic.
#[derive(Default)]
pub struct InMemoryCache {
    data: Mutex<BTreeMap<String, Value>>,
    ttls: Mutex<HashMap<String, Duration>>,
    published: Mutex<Vec<(String, String)>>,
    unavailable: AtomicBool,
    scan_calls: AtomicUsize,
    bad_mget_keys: Mutex<HashSet<String>>,
}

impl InMemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent command fail as if Redis were down
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn counter(&self, key: &str) -> Option<i64> {
        match self.data.lock().unwrap().get(key) {
            Some(Value::Str(s)) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn set_counter(&self, key: &str, value: i64) {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), Value::Str(value.to_string()));
    }

    /// Store a raw string value, e.g. a counter overwritten with garbage
    pub fn set_raw(&self, key: &str, value: &str) {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), Value::Str(value.to_string()));
    }

    /// Make any MGET that includes this key come back malformed
    pub fn corrupt_reads_of(&self, key: &str) {
        self.bad_mget_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn members(&self, key: &str) -> HashSet<String> {
        match self.data.lock().unwrap().get(key) {
            Some(Value::Set(set)) => set.clone(),
            _ => HashSet::new(),
        }
    }

    pub fn insert_member(&self, key: &str, member: &str) {
        let mut data = self.data.lock().unwrap();
        if let Value::Set(set) = data
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(HashSet::new()))
        {
            set.insert(member.to_string());
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().unwrap().contains_key(key)
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.ttls.lock().unwrap().get(key).copied()
    }

    pub fn clear_ttls(&self) {
        self.ttls.lock().unwrap().clear();
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    /// Keys and values excluding rate-limit windows
    pub fn counter_snapshot(&self) -> BTreeMap<String, String> {
        self.data
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| !key.starts_with("rate_limit:"))
            .map(|(key, value)| {
                let rendered = match value {
                    Value::Str(s) => s.clone(),
                    Value::Set(set) => {
                        let mut members: Vec<&String> = set.iter().collect();
                        members.sort();
                        format!("{:?}", members)
                    }
                    Value::Window(hits) => format!("{:?}", hits),
                };
                (key.clone(), rendered)
            })
            .collect()
    }

    fn check(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

/// Redis-style glob supporting only `*`
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl FastCache for InMemoryCache {
    async fn ping(&self) -> CacheResult<()> {
        self.check()
    }

    async fn is_member(&self, set_key: &str, member: &str) -> CacheResult<bool> {
        self.check()?;
        Ok(self.members(set_key).contains(member))
    }

    async fn add_member(&self, set_key: &str, member: &str) -> CacheResult<bool> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        match data
            .entry(set_key.to_string())
            .or_insert_with(|| Value::Set(HashSet::new()))
        {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(CacheError::Protocol("WRONGTYPE".to_string())),
        }
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> CacheResult<bool> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let removed = match data.get_mut(set_key) {
            Some(Value::Set(set)) => set.remove(member),
            Some(_) => return Err(CacheError::Protocol("WRONGTYPE".to_string())),
            None => false,
        };
        if matches!(data.get(set_key), Some(Value::Set(set)) if set.is_empty()) {
            data.remove(set_key);
        }
        Ok(removed)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.check()?;
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), Value::Str(value.to_string()));
        self.ttls.lock().unwrap().insert(key.to_string(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check()?;
        self.data.lock().unwrap().remove(key);
        self.ttls.lock().unwrap().remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let current = match data.get(key) {
            Some(Value::Str(s)) => s
                .parse::<i64>()
                .map_err(|_| CacheError::Protocol("value is not an integer".to_string()))?,
            Some(_) => return Err(CacheError::Protocol("WRONGTYPE".to_string())),
            None => 0,
        };
        let next = current + delta;
        data.insert(key.to_string(), Value::Str(next.to_string()));
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        self.check()?;
        if self.contains_key(key) {
            self.ttls.lock().unwrap().insert(key.to_string(), ttl);
        }
        Ok(())
    }

    async fn expire_many(&self, keys: &[String], ttl: Duration) -> CacheResult<()> {
        for key in keys {
            self.expire(key, ttl).await?;
        }
        Ok(())
    }

    async fn get_counter(&self, key: &str) -> CacheResult<Option<i64>> {
        self.check()?;
        Ok(self.counter(key))
    }

    // Same contract as RedisFastCache: a non-integer value reads as missing
    async fn get_counters(&self, keys: &[String]) -> CacheResult<Vec<Option<i64>>> {
        self.check()?;
        let bad = self.bad_mget_keys.lock().unwrap();
        if let Some(key) = keys.iter().find(|key| bad.contains(*key)) {
            return Err(CacheError::Protocol(format!("malformed MGET reply at {}", key)));
        }
        drop(bad);
        Ok(keys.iter().map(|key| self.counter(key)).collect())
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> CacheResult<(u64, Vec<String>)> {
        self.check()?;
        self.scan_calls.fetch_add(1, Ordering::SeqCst);

        // COUNT bounds how many keys are examined, not how many match
        let data = self.data.lock().unwrap();
        let start = cursor as usize;
        let examined: Vec<&String> = data.keys().skip(start).take(count.max(1)).collect();
        let next = start + examined.len();
        let page = examined
            .into_iter()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();

        let next_cursor = if next >= data.len() { 0 } else { next as u64 };
        Ok((next_cursor, page))
    }

    async fn hit_sliding_window(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        limit: u32,
    ) -> CacheResult<WindowHit> {
        self.check()?;
        let window_ms = window.as_millis() as i64;
        let mut data = self.data.lock().unwrap();
        let Value::Window(hits) = data
            .entry(key.to_string())
            .or_insert_with(|| Value::Window(Vec::new()))
        else {
            return Err(CacheError::Protocol("WRONGTYPE".to_string()));
        };

        hits.retain(|ts| *ts > now_ms - window_ms);
        if hits.len() as u32 >= limit {
            let oldest = hits.iter().min().copied().unwrap_or(now_ms);
            return Ok(WindowHit {
                allowed: false,
                count: hits.len() as u32,
                retry_after_ms: (oldest + window_ms - now_ms).max(0) as u64,
            });
        }

        hits.push(now_ms);
        Ok(WindowHit {
            allowed: true,
            count: hits.len() as u32,
            retry_after_ms: 0,
        })
    }

    async fn publish(&self, channel: &str, payload: &str) -> CacheResult<u64> {
        self.check()?;
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), payload.to_string()));
        Ok(1)
    }
}

#[derive(Debug, Clone)]
struct StoredVideo {
    status: VideoStatus,
    likes_count: i64,
    views_count: i64,
}

/// PostgreSQL stand-in with the same idempotence rules as the SQL
#[derive(Default)]
pub struct InMemoryStore {
    videos: Mutex<HashMap<VideoId, StoredVideo>>,
    likes: Mutex<HashSet<(UserId, VideoId)>>,
    fail_writes: AtomicBool,
    fail_snapshot_for: Mutex<HashSet<VideoId>>,
    snapshot_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_video(&self, id: &str, status: VideoStatus) {
        self.videos.lock().unwrap().insert(
            VideoId::from(id),
            StoredVideo {
                status,
                likes_count: 0,
                views_count: 0,
            },
        );
    }

    pub fn set_likes_count(&self, id: &str, count: i64) {
        if let Some(video) = self.videos.lock().unwrap().get_mut(&VideoId::from(id)) {
            video.likes_count = count;
        }
    }

    pub fn insert_like(&self, user: &str, video: &str) {
        self.likes
            .lock()
            .unwrap()
            .insert((UserId::from(user), VideoId::from(video)));
    }

    pub fn has_like_row(&self, user: &str, video: &str) -> bool {
        self.likes
            .lock()
            .unwrap()
            .contains(&(UserId::from(user), VideoId::from(video)))
    }

    pub fn durable_likes(&self, id: &str) -> Option<i64> {
        self.videos
            .lock()
            .unwrap()
            .get(&VideoId::from(id))
            .map(|v| v.likes_count)
    }

    pub fn durable_views(&self, id: &str) -> Option<i64> {
        self.videos
            .lock()
            .unwrap()
            .get(&VideoId::from(id))
            .map(|v| v.views_count)
    }

    /// Fail every durable write used by the toggle hot path
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail any snapshot batch that contains this video
    pub fn fail_snapshot_for(&self, id: &str) {
        self.fail_snapshot_for
            .lock()
            .unwrap()
            .insert(VideoId::from(id));
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("database is read-only"));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_video(&self, video_id: &VideoId) -> Result<Option<VideoRecord>> {
        Ok(self
            .videos
            .lock()
            .unwrap()
            .get(video_id)
            .map(|v| VideoRecord {
                id: video_id.clone(),
                status: v.status,
                likes_count: v.likes_count,
                views_count: v.views_count,
            }))
    }

    async fn likes_count(&self, video_id: &VideoId) -> Result<i64> {
        Ok(self
            .videos
            .lock()
            .unwrap()
            .get(video_id)
            .map(|v| v.likes_count)
            .unwrap_or(0))
    }

    async fn increment_likes(&self, video_id: &VideoId) -> Result<()> {
        self.check_write()?;
        if let Some(video) = self.videos.lock().unwrap().get_mut(video_id) {
            video.likes_count += 1;
        }
        Ok(())
    }

    async fn decrement_likes(&self, video_id: &VideoId) -> Result<()> {
        self.check_write()?;
        if let Some(video) = self.videos.lock().unwrap().get_mut(video_id) {
            video.likes_count = (video.likes_count - 1).max(0);
        }
        Ok(())
    }

    async fn create_like(&self, user_id: &UserId, video_id: &VideoId) -> Result<bool> {
        self.check_write()?;
        Ok(self
            .likes
            .lock()
            .unwrap()
            .insert((user_id.clone(), video_id.clone())))
    }

    async fn delete_like(&self, user_id: &UserId, video_id: &VideoId) -> Result<bool> {
        self.check_write()?;
        Ok(self
            .likes
            .lock()
            .unwrap()
            .remove(&(user_id.clone(), video_id.clone())))
    }

    async fn has_liked(&self, user_id: &UserId, video_id: &VideoId) -> Result<bool> {
        Ok(self
            .likes
            .lock()
            .unwrap()
            .contains(&(user_id.clone(), video_id.clone())))
    }

    async fn apply_counter_snapshot(
        &self,
        kind: CounterKind,
        counts: &[(VideoId, i64)],
    ) -> Result<u64> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);

        let poisoned = self.fail_snapshot_for.lock().unwrap();
        if let Some((id, _)) = counts.iter().find(|(id, _)| poisoned.contains(id)) {
            return Err(anyhow!("snapshot rejected for video {}", id));
        }
        drop(poisoned);

        // All-or-nothing like the single UPDATE ... FROM UNNEST transaction
        let mut videos = self.videos.lock().unwrap();
        let mut updated = 0;
        for (id, count) in counts {
            if let Some(video) = videos.get_mut(id) {
                match kind {
                    CounterKind::Likes => video.likes_count = *count,
                    CounterKind::Views => video.views_count = *count,
                }
                updated += 1;
            }
        }
        Ok(updated)
    }
}

/// Records every invalidated video
#[derive(Default)]
pub struct RecordingInvalidator {
    videos: Mutex<Vec<VideoId>>,
}

impl RecordingInvalidator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn invalidated(&self) -> Vec<VideoId> {
        self.videos.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageInvalidator for RecordingInvalidator {
    async fn invalidate_video(&self, video_id: &VideoId) -> CacheResult<()> {
        self.videos.lock().unwrap().push(video_id.clone());
        Ok(())
    }
}

pub struct Harness {
    pub cache: Arc<InMemoryCache>,
    pub store: Arc<InMemoryStore>,
    pub pages: Arc<RecordingInvalidator>,
    pub service: LikeService,
}

pub fn harness() -> Harness {
    harness_with(EngagementConfig::default())
}

pub fn harness_with(config: EngagementConfig) -> Harness {
    let cache = InMemoryCache::new();
    let store = InMemoryStore::new();
    let pages = RecordingInvalidator::new();
    let service = LikeService::new(cache.clone(), store.clone(), pages.clone(), &config);

    Harness {
        cache,
        store,
        pages,
        service,
    }
}

/// Poll until the detached durable write lands, panicking after two seconds
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Let spawned tasks run to completion without asserting anything
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}
