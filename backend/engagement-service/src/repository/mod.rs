pub mod likes;

pub use likes::PgCounterStore;

use crate::domain::{CounterKind, UserId, VideoId, VideoRecord};
use anyhow::Result;

/// Durable store operations used by the engine and the reconciliation job.
///
/// Counter columns are never read-then-written by callers: they are either moved
/// atomically by one (best-effort sync) or overwritten wholesale (reconciliation).
#[async_trait::async_trait]
pub trait CounterStore: Send + Sync {
    /// Round-trip health check
    async fn ping(&self) -> Result<()>;

    async fn find_video(&self, video_id: &VideoId) -> Result<Option<VideoRecord>>;

    /// Durable like counter, 0 when the video is unknown
    async fn likes_count(&self, video_id: &VideoId) -> Result<i64>;

    async fn increment_likes(&self, video_id: &VideoId) -> Result<()>;

    /// Decrement, never below zero
    async fn decrement_likes(&self, video_id: &VideoId) -> Result<()>;

    /// Insert the membership row, returns false when it already existed
    async fn create_like(&self, user_id: &UserId, video_id: &VideoId) -> Result<bool>;

    /// Delete the membership row, returns false when there was none
    async fn delete_like(&self, user_id: &UserId, video_id: &VideoId) -> Result<bool>;

    async fn has_liked(&self, user_id: &UserId, video_id: &VideoId) -> Result<bool>;

    /// Overwrite one counter column for many videos inside a single transaction.
    /// Returns the number of rows updated; unknown video ids are skipped.
    async fn apply_counter_snapshot(
        &self,
        kind: CounterKind,
        counts: &[(VideoId, i64)],
    ) -> Result<u64>;
}
