//! Page-level cache invalidation
//!
//! Rendered pages embed like counts. After a toggle, subscribers on the
//! `cache:invalidate` channel drop their copies of the affected pages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::FastCache;
use crate::domain::VideoId;
use crate::error::CacheResult;

pub const INVALIDATION_CHANNEL: &str = "cache:invalidate";

#[async_trait]
pub trait PageInvalidator: Send + Sync {
    async fn invalidate_video(&self, video_id: &VideoId) -> CacheResult<()>;
}

/// Broadcast message consumed by the rendering tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub message_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub paths: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source_service: String,
}

impl InvalidationMessage {
    pub fn for_video(video_id: &VideoId, source_service: &str) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            entity_type: "video".to_string(),
            entity_id: video_id.to_string(),
            paths: video_paths(video_id),
            timestamp: chrono::Utc::now(),
            source_service: source_service.to_string(),
        }
    }
}

/// Pages that display a video's like count
pub fn video_paths(video_id: &VideoId) -> Vec<String> {
    vec![format!("/video/{}", video_id), format!("/embed/{}", video_id)]
}

/// Publishes invalidations over Redis pub/sub
#[derive(Clone)]
pub struct PubSubInvalidator {
    cache: Arc<dyn FastCache>,
    source_service: String,
}

impl PubSubInvalidator {
    pub fn new(cache: Arc<dyn FastCache>, source_service: impl Into<String>) -> Self {
        Self {
            cache,
            source_service: source_service.into(),
        }
    }
}

#[async_trait]
impl PageInvalidator for PubSubInvalidator {
    async fn invalidate_video(&self, video_id: &VideoId) -> CacheResult<()> {
        let message = InvalidationMessage::for_video(video_id, &self.source_service);
        let payload = serde_json::to_string(&message)
            .map_err(|e| crate::error::CacheError::Protocol(e.to_string()))?;

        let receivers = self.cache.publish(INVALIDATION_CHANNEL, &payload).await?;
        tracing::debug!(
            video_id = %video_id,
            receivers,
            "Published page invalidation"
        );
        Ok(())
    }
}

/// For deployments without a rendering-tier subscriber
#[derive(Clone, Default)]
pub struct NoopInvalidator;

#[async_trait]
impl PageInvalidator for NoopInvalidator {
    async fn invalidate_video(&self, _video_id: &VideoId) -> CacheResult<()> {
        Ok(())
    }
}
