use std::sync::Arc;
use std::time::Duration;

use crate::cache::FastCache;
use crate::config::{FailureMode, RateLimitConfig};
use crate::domain::Caller;

/// Verdict for one guarded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

/// Sliding-window limiter layered on the fast cache.
///
/// Hits are kept as timestamps in a sorted set per subject, so a burst at the end of
/// one minute still counts against the start of the next.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn FastCache>,
    action: &'static str,
    config: RateLimitConfig,
    failure_mode: FailureMode,
}

impl RateLimiter {
    pub fn new(
        cache: Arc<dyn FastCache>,
        action: &'static str,
        config: RateLimitConfig,
        failure_mode: FailureMode,
    ) -> Self {
        Self {
            cache,
            action,
            config,
            failure_mode,
        }
    }

    /// Rate limit key for a caller: user id when signed in, otherwise client IP
    pub fn key_for(&self, caller: &Caller) -> String {
        match (&caller.user_id, &caller.client_ip) {
            (Some(user_id), _) => format!("rate_limit:{}:user:{}", self.action, user_id),
            (None, Some(ip)) => format!("rate_limit:{}:ip:{}", self.action, ip),
            (None, None) => format!("rate_limit:{}:ip:anonymous", self.action),
        }
    }

    pub async fn check(&self, caller: &Caller) -> RateLimitDecision {
        let key = self.key_for(caller);
        let now_ms = chrono::Utc::now().timestamp_millis();

        match self
            .cache
            .hit_sliding_window(
                &key,
                now_ms,
                self.config.window(),
                self.config.max_requests,
            )
            .await
        {
            Ok(hit) if hit.allowed => RateLimitDecision::Allowed {
                remaining: self.config.max_requests.saturating_sub(hit.count),
            },
            Ok(hit) => {
                tracing::debug!(
                    key = %key,
                    count = hit.count,
                    limit = self.config.max_requests,
                    "Rate limit exceeded"
                );
                RateLimitDecision::Limited {
                    retry_after_secs: retry_after_secs(hit.retry_after_ms),
                }
            }
            Err(e) => match self.failure_mode {
                FailureMode::FailOpen => {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "Rate limit cache error (allowing request)"
                    );
                    RateLimitDecision::Allowed {
                        remaining: self.config.max_requests,
                    }
                }
                FailureMode::FailClosed => {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "Rate limit cache error (rejecting request)"
                    );
                    RateLimitDecision::Limited {
                        retry_after_secs: self.config.window_seconds.max(1),
                    }
                }
            },
        }
    }
}

fn retry_after_secs(retry_after_ms: u64) -> u64 {
    Duration::from_millis(retry_after_ms)
        .as_secs()
        .saturating_add(u64::from(retry_after_ms % 1000 != 0))
        .max(1)
}
