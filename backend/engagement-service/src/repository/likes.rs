use crate::domain::{CounterKind, UserId, VideoId, VideoRecord, VideoStatus};
use anyhow::{anyhow, Context, Result};
use sqlx::PgPool;

use super::CounterStore;

/// PostgreSQL implementation of the durable counter store
#[derive(Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CounterStore for PgCounterStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Failed to ping PostgreSQL")?;
        Ok(())
    }

    async fn find_video(&self, video_id: &VideoId) -> Result<Option<VideoRecord>> {
        let row: Option<(String, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, status, likes_count, views_count
            FROM videos
            WHERE id = $1
            "#,
        )
        .bind(video_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load video")?;

        let Some((id, status, likes_count, views_count)) = row else {
            return Ok(None);
        };

        let status = status.parse::<VideoStatus>().map_err(|e| anyhow!(e))?;
        Ok(Some(VideoRecord {
            id: VideoId::from(id),
            status,
            likes_count,
            views_count,
        }))
    }

    async fn likes_count(&self, video_id: &VideoId) -> Result<i64> {
        let count: Option<i64> =
            sqlx::query_scalar("SELECT likes_count FROM videos WHERE id = $1")
                .bind(video_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load like count from PostgreSQL")?;

        Ok(count.unwrap_or(0))
    }

    async fn increment_likes(&self, video_id: &VideoId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET likes_count = likes_count + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(video_id.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to increment like count")?;
        Ok(())
    }

    async fn decrement_likes(&self, video_id: &VideoId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET likes_count = GREATEST(likes_count - 1, 0), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(video_id.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to decrement like count")?;
        Ok(())
    }

    async fn create_like(&self, user_id: &UserId, video_id: &VideoId) -> Result<bool> {
        // Duplicate inserts are expected when a toggle is replayed
        let result = sqlx::query(
            r#"
            INSERT INTO video_likes (user_id, video_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, video_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_str())
        .bind(video_id.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to create like")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_like(&self, user_id: &UserId, video_id: &VideoId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM video_likes
            WHERE user_id = $1 AND video_id = $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(video_id.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to delete like")?;

        Ok(result.rows_affected() > 0)
    }

    async fn has_liked(&self, user_id: &UserId, video_id: &VideoId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM video_likes
                WHERE user_id = $1 AND video_id = $2
            )
            "#,
        )
        .bind(user_id.as_str())
        .bind(video_id.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to check like membership")?;

        Ok(exists)
    }

    async fn apply_counter_snapshot(
        &self,
        kind: CounterKind,
        counts: &[(VideoId, i64)],
    ) -> Result<u64> {
        if counts.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = counts.iter().map(|(id, _)| id.as_str().to_string()).collect();
        let values: Vec<i64> = counts.iter().map(|(_, count)| *count).collect();

        let sql = match kind {
            CounterKind::Likes => {
                r#"
                UPDATE videos AS v
                SET likes_count = s.count, updated_at = NOW()
                FROM UNNEST($1::text[], $2::bigint[]) AS s(id, count)
                WHERE v.id = s.id
                "#
            }
            CounterKind::Views => {
                r#"
                UPDATE videos AS v
                SET views_count = s.count, updated_at = NOW()
                FROM UNNEST($1::text[], $2::bigint[]) AS s(id, count)
                WHERE v.id = s.id
                "#
            }
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin counter snapshot transaction")?;

        let result = sqlx::query(sql)
            .bind(&ids)
            .bind(&values)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to apply {} counter snapshot", kind.label()))?;

        tx.commit()
            .await
            .context("Failed to commit counter snapshot transaction")?;

        Ok(result.rows_affected())
    }
}
