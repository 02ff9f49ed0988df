use std::sync::Arc;
use std::time::Duration;

use crate::cache::{keys, FastCache};
use crate::config::EngagementConfig;
use crate::domain::{Caller, LikeStatus, UserId, VideoId, VideoStatus};
use crate::error::{CacheResult, EngagementError};
use crate::metrics;
use crate::repository::CounterStore;
use crate::services::page_cache::PageInvalidator;
use crate::services::rate_limit::{RateLimitDecision, RateLimiter};

/// Like/view engine.
///
/// The fast cache answers every call; the durable store is updated on detached
/// tasks and corrected wholesale by the reconciliation job. There is no
/// process-local lock: concurrent requests are serialized only by the cache's
/// atomic SADD/SREM/INCRBY.
#[derive(Clone)]
pub struct LikeService {
    cache: Arc<dyn FastCache>,
    store: Arc<dyn CounterStore>,
    pages: Arc<dyn PageInvalidator>,
    like_limiter: RateLimiter,
    view_limiter: RateLimiter,
    like_ttl: Duration,
}

/// Durable write issued after a toggle, never awaited by the caller
#[derive(Debug, Clone)]
enum DurableSync {
    Like { user_id: UserId, video_id: VideoId },
    Unlike { user_id: UserId, video_id: VideoId },
}

impl LikeService {
    pub fn new(
        cache: Arc<dyn FastCache>,
        store: Arc<dyn CounterStore>,
        pages: Arc<dyn PageInvalidator>,
        config: &EngagementConfig,
    ) -> Self {
        let like_limiter = RateLimiter::new(
            cache.clone(),
            "like",
            config.like_rate_limit.clone(),
            config.rate_limit_failure_mode,
        );
        let view_limiter = RateLimiter::new(
            cache.clone(),
            "view",
            config.view_rate_limit.clone(),
            config.rate_limit_failure_mode,
        );

        Self {
            cache,
            store,
            pages,
            like_limiter,
            view_limiter,
            like_ttl: config.like_key_ttl(),
        }
    }

    /// Flip the caller's like on a video and return the new state with the live count
    pub async fn toggle_like(
        &self,
        caller: &Caller,
        video_id: &VideoId,
    ) -> Result<LikeStatus, EngagementError> {
        let Some(user_id) = caller.user_id.as_ref() else {
            metrics::record_failure("toggle_like", "unauthenticated");
            return Err(EngagementError::AuthenticationRequired);
        };

        if let RateLimitDecision::Limited { retry_after_secs } =
            self.like_limiter.check(caller).await
        {
            metrics::record_failure("toggle_like", "rate_limited");
            return Err(EngagementError::RateLimited { retry_after_secs });
        }

        self.ensure_likeable(video_id).await?;

        let status = self.apply_toggle(user_id, video_id).await.map_err(|e| {
            tracing::error!(
                video_id = %video_id,
                user_id = %user_id,
                error = %e,
                "Like toggle failed on fast cache"
            );
            metrics::record_failure("toggle_like", "cache");
            EngagementError::ToggleFailed(e)
        })?;

        self.invalidate_pages(video_id).await;
        metrics::record_toggle(status.liked);

        tracing::debug!(
            video_id = %video_id,
            user_id = %user_id,
            liked = status.liked,
            count = status.count,
            "Like toggled"
        );

        Ok(status)
    }

    /// Current like state for initial page render. Never fails: internal errors
    /// degrade to "not liked, zero likes".
    pub async fn get_like_status(&self, caller: &Caller, video_id: &VideoId) -> LikeStatus {
        match self.load_like_status(caller, video_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    video_id = %video_id,
                    error = %e,
                    "Failed to load like status, returning default"
                );
                metrics::record_failure("get_like_status", "degraded");
                LikeStatus::unknown()
            }
        }
    }

    /// Count one view. Views are cache-only until the next reconciliation pass.
    pub async fn record_view(
        &self,
        caller: &Caller,
        video_id: &VideoId,
    ) -> Result<i64, EngagementError> {
        if let RateLimitDecision::Limited { retry_after_secs } =
            self.view_limiter.check(caller).await
        {
            metrics::record_failure("record_view", "rate_limited");
            return Err(EngagementError::RateLimited { retry_after_secs });
        }

        let key = keys::view_count(video_id);
        let count = self.cache.increment(&key, 1).await.map_err(|e| {
            tracing::error!(video_id = %video_id, error = %e, "Failed to record view");
            metrics::record_failure("record_view", "cache");
            EngagementError::ViewFailed(e)
        })?;

        // Counter was just created
        if count == 1 {
            if let Err(e) = self.cache.expire(&key, self.like_ttl).await {
                tracing::warn!(video_id = %video_id, error = %e, "Failed to set TTL on view counter");
            }
        }

        Ok(count)
    }

    async fn ensure_likeable(&self, video_id: &VideoId) -> Result<(), EngagementError> {
        let video = self.store.find_video(video_id).await.map_err(|e| {
            tracing::error!(video_id = %video_id, error = %e, "Failed to load video");
            metrics::record_failure("toggle_like", "store");
            EngagementError::Internal(format!("failed to load video {}", video_id))
        })?;

        match video {
            None => {
                metrics::record_failure("toggle_like", "not_found");
                Err(EngagementError::NotFound(video_id.clone()))
            }
            Some(video) if video.status != VideoStatus::Published => {
                metrics::record_failure("toggle_like", "invalid_state");
                Err(EngagementError::InvalidState {
                    video_id: video_id.clone(),
                    status: video.status,
                })
            }
            Some(_) => Ok(()),
        }
    }

    async fn apply_toggle(&self, user_id: &UserId, video_id: &VideoId) -> CacheResult<LikeStatus> {
        let set_key = keys::liked_by(video_id);
        if self.cache.is_member(&set_key, user_id.as_str()).await? {
            self.unlike(user_id, video_id).await
        } else {
            self.like(user_id, video_id).await
        }
    }

    async fn like(&self, user_id: &UserId, video_id: &VideoId) -> CacheResult<LikeStatus> {
        let set_key = keys::liked_by(video_id);
        let counter_key = keys::like_count(video_id);

        let added = self.cache.add_member(&set_key, user_id.as_str()).await?;
        self.cache
            .set_with_ttl(&keys::like_marker(user_id, video_id), "1", self.like_ttl)
            .await?;

        let count = if added {
            let count = self.cache.increment(&counter_key, 1).await?;
            self.spawn_durable_sync(DurableSync::Like {
                user_id: user_id.clone(),
                video_id: video_id.clone(),
            });
            count
        } else {
            // A concurrent toggle by the same user already counted this like
            self.cache.get_counter(&counter_key).await?.unwrap_or(0)
        };

        self.cache.expire(&counter_key, self.like_ttl).await?;
        self.cache.expire(&set_key, self.like_ttl).await?;

        Ok(LikeStatus::new(true, count))
    }

    async fn unlike(&self, user_id: &UserId, video_id: &VideoId) -> CacheResult<LikeStatus> {
        let set_key = keys::liked_by(video_id);
        let counter_key = keys::like_count(video_id);

        let removed = self.cache.remove_member(&set_key, user_id.as_str()).await?;
        self.cache
            .delete(&keys::like_marker(user_id, video_id))
            .await?;

        let count = if removed {
            // May go below zero when the counter key expired before the set did;
            // only the reported value is clamped.
            let count = self.cache.increment(&counter_key, -1).await?;
            self.spawn_durable_sync(DurableSync::Unlike {
                user_id: user_id.clone(),
                video_id: video_id.clone(),
            });
            count
        } else {
            self.cache.get_counter(&counter_key).await?.unwrap_or(0)
        };

        Ok(LikeStatus::new(false, count))
    }

    async fn load_like_status(
        &self,
        caller: &Caller,
        video_id: &VideoId,
    ) -> anyhow::Result<LikeStatus> {
        // The counter key is not warmed from the durable value here: a lagging
        // durable count written into the cache would become the live value and
        // be mirrored back by reconciliation.
        let count = match self.cache.get_counter(&keys::like_count(video_id)).await? {
            Some(count) => count,
            None => self.store.likes_count(video_id).await?,
        };

        let liked = match caller.user_id.as_ref() {
            None => false,
            Some(user_id) => self.load_membership(user_id, video_id).await?,
        };

        Ok(LikeStatus::new(liked, count))
    }

    async fn load_membership(&self, user_id: &UserId, video_id: &VideoId) -> anyhow::Result<bool> {
        let set_key = keys::liked_by(video_id);
        if self.cache.is_member(&set_key, user_id.as_str()).await? {
            return Ok(true);
        }

        if !self.store.has_liked(user_id, video_id).await? {
            return Ok(false);
        }

        // Cold cache: rebuild membership from the durable row
        match self.cache.add_member(&set_key, user_id.as_str()).await {
            Ok(_) => tracing::debug!(
                video_id = %video_id,
                user_id = %user_id,
                "Warmed like membership from durable store"
            ),
            Err(e) => tracing::warn!(
                video_id = %video_id,
                user_id = %user_id,
                error = %e,
                "Failed to warm like membership"
            ),
        }

        Ok(true)
    }

    async fn invalidate_pages(&self, video_id: &VideoId) {
        if let Err(e) = self.pages.invalidate_video(video_id).await {
            tracing::warn!(video_id = %video_id, error = %e, "Failed to invalidate video pages");
        }
    }

    fn spawn_durable_sync(&self, sync: DurableSync) {
        let store = self.store.clone();
        tokio::spawn(async move {
            apply_durable_sync(store.as_ref(), sync).await;
        });
    }
}

/// Mirror a toggle into the durable store. Failures are logged and dropped; the
/// reconciliation pass overwrites the counter anyway.
async fn apply_durable_sync(store: &dyn CounterStore, sync: DurableSync) {
    match sync {
        DurableSync::Like { user_id, video_id } => {
            match store.create_like(&user_id, &video_id).await {
                Ok(true) => {
                    if let Err(e) = store.increment_likes(&video_id).await {
                        tracing::warn!(
                            video_id = %video_id,
                            error = %e,
                            "Failed to increment durable like count"
                        );
                        metrics::record_durable_sync_failure("increment_likes");
                    }
                }
                // Row already present, the durable count already includes it
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        video_id = %video_id,
                        user_id = %user_id,
                        error = %e,
                        "Failed to create durable like"
                    );
                    metrics::record_durable_sync_failure("create_like");
                }
            }
        }
        DurableSync::Unlike { user_id, video_id } => {
            match store.delete_like(&user_id, &video_id).await {
                Ok(true) => {
                    if let Err(e) = store.decrement_likes(&video_id).await {
                        tracing::warn!(
                            video_id = %video_id,
                            error = %e,
                            "Failed to decrement durable like count"
                        );
                        metrics::record_durable_sync_failure("decrement_likes");
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        video_id = %video_id,
                        user_id = %user_id,
                        error = %e,
                        "Failed to delete durable like"
                    );
                    metrics::record_durable_sync_failure("delete_like");
                }
            }
        }
    }
}
