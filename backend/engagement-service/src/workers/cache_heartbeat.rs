//! Fast-cache heartbeat.
//!
//! Idle pooled Redis connections go stale between traffic bursts and the first
//! like toggle afterwards fails with a broken pipe. Pinging on a fixed interval
//! keeps the connection warm and lets `ConnectionManager` reconnect before a
//! user-facing call does.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::cache::FastCache;
use crate::error::CacheResult;
use crate::metrics;

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Delay before the first ping so startup traffic settles
    pub initial_delay: Duration,
    /// Failures in a row before logging escalates to error
    pub critical_after: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(10),
            critical_after: 5,
        }
    }
}

/// What a single ping result means given the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    Healthy,
    Recovered { after_failures: u32 },
    Failing { consecutive: u32 },
    Critical { consecutive: u32 },
}

/// Consecutive-failure tracker
#[derive(Debug, Default)]
pub struct FailureStreak {
    consecutive: u32,
    critical_after: u32,
}

impl FailureStreak {
    pub fn new(critical_after: u32) -> Self {
        Self {
            consecutive: 0,
            critical_after: critical_after.max(1),
        }
    }

    pub fn record<T>(&mut self, result: &CacheResult<T>) -> Beat {
        match result {
            Ok(_) => {
                let previous = std::mem::take(&mut self.consecutive);
                if previous > 0 {
                    Beat::Recovered {
                        after_failures: previous,
                    }
                } else {
                    Beat::Healthy
                }
            }
            Err(_) => {
                self.consecutive = self.consecutive.saturating_add(1);
                if self.consecutive >= self.critical_after {
                    Beat::Critical {
                        consecutive: self.consecutive,
                    }
                } else {
                    Beat::Failing {
                        consecutive: self.consecutive,
                    }
                }
            }
        }
    }
}

/// Ping the cache forever. Returns immediately when disabled.
pub async fn run(cache: Arc<dyn FastCache>, config: HeartbeatConfig) {
    if !config.enabled {
        tracing::info!("Cache heartbeat disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Starting cache heartbeat"
    );
    sleep(config.initial_delay).await;

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut streak = FailureStreak::new(config.critical_after);

    loop {
        ticker.tick().await;

        let result = cache.ping().await;
        metrics::set_cache_up(result.is_ok());

        match (streak.record(&result), result) {
            (Beat::Healthy, _) => tracing::debug!("Cache heartbeat OK"),
            (Beat::Recovered { after_failures }, _) => {
                tracing::info!(previous_failures = after_failures, "Cache connection recovered")
            }
            (Beat::Failing { consecutive }, Err(e)) => {
                tracing::warn!(consecutive_failures = consecutive, error = %e, "Cache heartbeat failed")
            }
            (Beat::Critical { consecutive }, Err(e)) => tracing::error!(
                consecutive_failures = consecutive,
                error = %e,
                "Cache heartbeat failing repeatedly"
            ),
            _ => {}
        }
    }
}
