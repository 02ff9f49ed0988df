use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{keys, FastCache};
use crate::config::ReconcileConfig;
use crate::domain::{CounterKind, VideoId};
use crate::error::{CacheError, CacheResult};
use crate::metrics;
use crate::repository::CounterStore;

/// Result of reconciling one counter family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FamilyReport {
    /// Counter keys found by the scan
    pub keys_found: u64,
    /// Durable rows overwritten
    pub rows_synced: u64,
    /// Batches that could not be read from the cache or written durably
    pub failed_batches: u64,
}

/// Result of a full reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub likes: FamilyReport,
    pub views: FamilyReport,
    pub duration: Duration,
}

/// Mirrors live cache counters into the durable store.
///
/// Always writes the absolute cache value, so running it twice with no traffic in
/// between leaves the durable store unchanged. Cache keys are never deleted: they
/// remain the live read source.
#[derive(Clone)]
pub struct CounterReconciler {
    cache: Arc<dyn FastCache>,
    store: Arc<dyn CounterStore>,
    config: ReconcileConfig,
}

impl CounterReconciler {
    pub fn new(
        cache: Arc<dyn FastCache>,
        store: Arc<dyn CounterStore>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            cache,
            store,
            config,
        }
    }

    /// Run one pass over both counter families. An unreachable cache aborts the pass
    /// and is returned; malformed replies and durable-store failures are contained
    /// per batch.
    pub async fn run(&self) -> CacheResult<ReconcileReport> {
        let started = Instant::now();

        let likes = self.reconcile_family(CounterKind::Likes).await?;
        let views = self.reconcile_family(CounterKind::Views).await?;

        let duration = started.elapsed();
        metrics::observe_reconcile_duration(duration.as_secs_f64());

        tracing::info!(
            like_keys = likes.keys_found,
            likes_synced = likes.rows_synced,
            view_keys = views.keys_found,
            views_synced = views.rows_synced,
            failed_batches = likes.failed_batches + views.failed_batches,
            duration_ms = duration.as_millis() as u64,
            "Counter reconciliation completed"
        );

        Ok(ReconcileReport {
            likes,
            views,
            duration,
        })
    }

    /// Scan one family and flush it in batches as pages arrive, so memory stays
    /// bounded by the batch size rather than the keyspace.
    async fn reconcile_family(&self, kind: CounterKind) -> CacheResult<FamilyReport> {
        let pattern = keys::counter_pattern(kind);
        let mut report = FamilyReport::default();
        let mut pending = PendingBatch::new(self.config.batch_size);
        let mut batch_index = 0;
        let mut cursor: u64 = 0;

        // SCAN pages are not guaranteed to cover the keyspace in one round trip, so
        // the loop only stops once the cursor comes back to 0.
        loop {
            let (next_cursor, page) = self
                .cache
                .scan(cursor, pattern, self.config.scan_count)
                .await?;

            for key in page {
                if pending.push(key) {
                    let batch = pending.take();
                    self.flush_batch(kind, batch_index, &batch, &mut report)
                        .await?;
                    batch_index += 1;
                }
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        let rest = pending.take();
        if !rest.is_empty() {
            self.flush_batch(kind, batch_index, &rest, &mut report)
                .await?;
        }

        metrics::record_reconcile(
            kind.label(),
            report.keys_found,
            report.rows_synced,
            report.failed_batches,
        );

        Ok(report)
    }

    /// Read one batch of counters and overwrite the durable rows. Only an unreachable
    /// cache is returned as an error; anything else fails this batch alone.
    async fn flush_batch(
        &self,
        kind: CounterKind,
        index: usize,
        batch: &[String],
        report: &mut FamilyReport,
    ) -> CacheResult<()> {
        report.keys_found += batch.len() as u64;

        let values = match self.cache.get_counters(batch).await {
            Ok(values) => values,
            Err(CacheError::Protocol(reason)) => {
                report.failed_batches += 1;
                tracing::error!(
                    family = kind.label(),
                    batch = index,
                    batch_len = batch.len(),
                    reason = %reason,
                    "Failed to read counter batch, continuing"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let counts = collect_counts(kind, batch, &values);
        if counts.is_empty() {
            return Ok(());
        }

        match self.store.apply_counter_snapshot(kind, &counts).await {
            Ok(rows) => report.rows_synced += rows,
            Err(e) => {
                report.failed_batches += 1;
                tracing::error!(
                    family = kind.label(),
                    batch = index,
                    batch_len = counts.len(),
                    error = %e,
                    "Failed to sync counter batch, continuing"
                );
            }
        }

        if kind == CounterKind::Likes {
            self.refresh_like_ttls(batch).await;
        }

        Ok(())
    }

    async fn refresh_like_ttls(&self, batch: &[String]) {
        if let Err(e) = self
            .cache
            .expire_many(batch, self.config.like_key_ttl())
            .await
        {
            tracing::warn!(
                batch_len = batch.len(),
                error = %e,
                "Failed to refresh like counter TTLs"
            );
        }
    }
}

/// Pair each key with its value, dropping keys that expired mid-scan or carry no id
fn collect_counts(
    kind: CounterKind,
    batch: &[String],
    values: &[Option<i64>],
) -> Vec<(VideoId, i64)> {
    batch
        .iter()
        .zip(values.iter())
        .filter_map(|(key, value)| {
            let count = (*value)?;
            let video_id = keys::parse_counter_key(kind, key)?;
            Some((video_id, count.max(0)))
        })
        .collect()
}

/// Keys waiting to be flushed. SCAN may return a key more than once; repeats are
/// dropped within a batch. A repeat across batches is written twice with the same
/// absolute value.
struct PendingBatch {
    keys: Vec<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl PendingBatch {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            keys: Vec::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a key, returns true once the batch is full
    fn push(&mut self, key: String) -> bool {
        if self.seen.insert(key.clone()) {
            self.keys.push(key);
        }
        self.keys.len() >= self.capacity
    }

    fn take(&mut self) -> Vec<String> {
        self.seen.clear();
        std::mem::take(&mut self.keys)
    }
}
