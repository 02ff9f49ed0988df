//! Prometheus metrics for the like/view pipeline

use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Encoder, Histogram,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static::lazy_static! {
    /// Like toggles by resulting action (like/unlike)
    static ref LIKE_TOGGLES: IntCounterVec = register_int_counter_vec!(
        "engagement_like_toggles_total",
        "Like toggles applied to the fast cache",
        &["action"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Hot-path failures by reason
    static ref ENGAGEMENT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "engagement_failures_total",
        "Like/view operations rejected or failed",
        &["operation", "reason"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Best-effort durable writes that failed and were dropped
    static ref DURABLE_SYNC_FAILURES: IntCounterVec = register_int_counter_vec!(
        "engagement_durable_sync_failures_total",
        "Detached durable-store writes that failed",
        &["operation"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Reconciliation results by counter family and outcome
    static ref RECONCILE_RESULTS: IntCounterVec = register_int_counter_vec!(
        "engagement_reconcile_total",
        "Counter reconciliation keys, rows and failed batches",
        &["family", "kind"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref RECONCILE_DURATION: Histogram = register_histogram!(
        "engagement_reconcile_duration_seconds",
        "Wall-clock duration of a reconciliation pass",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// 1 while the last heartbeat ping succeeded
    static ref CACHE_UP: IntGauge = register_int_gauge!(
        "engagement_cache_up",
        "Whether the fast cache answered the last heartbeat"
    ).expect("Prometheus metrics registration should succeed at startup");
}

pub fn record_toggle(liked: bool) {
    let action = if liked { "like" } else { "unlike" };
    LIKE_TOGGLES.with_label_values(&[action]).inc();
}

pub fn record_failure(operation: &str, reason: &str) {
    ENGAGEMENT_FAILURES
        .with_label_values(&[operation, reason])
        .inc();
}

pub fn record_durable_sync_failure(operation: &str) {
    DURABLE_SYNC_FAILURES.with_label_values(&[operation]).inc();
}

pub fn record_reconcile(family: &str, keys_found: u64, rows_synced: u64, failed_batches: u64) {
    RECONCILE_RESULTS
        .with_label_values(&[family, "keys_found"])
        .inc_by(keys_found);
    RECONCILE_RESULTS
        .with_label_values(&[family, "rows_synced"])
        .inc_by(rows_synced);
    RECONCILE_RESULTS
        .with_label_values(&[family, "failed_batches"])
        .inc_by(failed_batches);
}

pub fn observe_reconcile_duration(seconds: f64) {
    RECONCILE_DURATION.observe(seconds);
}

pub fn set_cache_up(up: bool) {
    CACHE_UP.set(i64::from(up));
}

/// Render the default registry in the Prometheus text format
pub fn render() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
