/// Configuration management for Engagement Service
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Like/view engine settings. The binary only serves the cron, health
    /// and metrics routes; these are read for embedders building `LikeService`.
    pub engagement: EngagementConfig,
    /// Reconciliation job settings
    pub reconcile: ReconcileConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port for the cron trigger, health and metrics
    pub http_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
    /// Run the periodic PING keepalive
    pub health_check_enabled: bool,
}

/// What to do when the rate limiter cannot reach the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureMode {
    /// Allow the request and log a warning
    FailOpen,
    /// Reject the request as rate limited
    FailClosed,
}

/// Sliding-window limit for one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Like/view engine settings, consumed by `LikeService`.
///
/// The shipped binary never builds a `LikeService`: the web app that owns the
/// like and view routes embeds the library and loads these through
/// [`Config::from_env`]. `like_key_ttl_days` is shared with [`ReconcileConfig`]
/// so both sides refresh like keys with the same TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementConfig {
    /// Like toggles per user
    pub like_rate_limit: RateLimitConfig,
    /// Recorded views per user or IP
    pub view_rate_limit: RateLimitConfig,
    pub rate_limit_failure_mode: FailureMode,
    /// TTL of like-related cache keys
    pub like_key_ttl_days: u64,
}

impl EngagementConfig {
    pub fn like_key_ttl(&self) -> Duration {
        Duration::from_secs(self.like_key_ttl_days * 24 * 60 * 60)
    }
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            like_rate_limit: RateLimitConfig {
                max_requests: default_like_rate_limit(),
                window_seconds: default_rate_limit_window(),
            },
            view_rate_limit: RateLimitConfig {
                max_requests: default_view_rate_limit(),
                window_seconds: default_rate_limit_window(),
            },
            rate_limit_failure_mode: FailureMode::FailOpen,
            like_key_ttl_days: default_like_key_ttl_days(),
        }
    }
}

/// Reconciliation job settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Shared secret expected in `Authorization: Bearer ...`
    #[serde(skip_serializing)]
    pub cron_secret: Option<String>,
    /// Keys per durable-store transaction
    pub batch_size: usize,
    /// COUNT hint per SCAN call
    pub scan_count: usize,
    /// TTL refreshed on like counters observed during a pass
    pub like_key_ttl_days: u64,
}

impl ReconcileConfig {
    pub fn like_key_ttl(&self) -> Duration {
        Duration::from_secs(self.like_key_ttl_days * 24 * 60 * 60)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            cron_secret: None,
            batch_size: default_batch_size(),
            scan_count: default_scan_count(),
            like_key_ttl_days: default_like_key_ttl_days(),
        }
    }
}

// Default values
fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_like_rate_limit() -> u32 {
    10
}

fn default_view_rate_limit() -> u32 {
    30
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_like_key_ttl_days() -> u64 {
    30
}

fn default_batch_size() -> usize {
    50
}

fn default_scan_count() -> usize {
    100
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_parse("PORT").unwrap_or(8086),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_parse("DB_MAX_CONNECTIONS")
                .unwrap_or_else(default_max_connections),
            min_connections: env_parse("DB_MIN_CONNECTIONS")
                .unwrap_or_else(default_min_connections),
        };

        let redis = RedisConfig {
            url: std::env::var("REDIS_URL").context("REDIS_URL environment variable not set")?,
            health_check_enabled: env_flag("REDIS_HEALTH_CHECK_ENABLED", true),
        };

        let like_key_ttl_days = env_parse("LIKE_KEY_TTL_DAYS")
            .filter(|days: &u64| *days > 0)
            .unwrap_or_else(default_like_key_ttl_days);

        let engagement = EngagementConfig {
            like_rate_limit: RateLimitConfig {
                max_requests: env_parse("LIKE_RATE_LIMIT_MAX")
                    .unwrap_or_else(default_like_rate_limit),
                window_seconds: env_parse("LIKE_RATE_LIMIT_WINDOW_SECS")
                    .unwrap_or_else(default_rate_limit_window),
            },
            view_rate_limit: RateLimitConfig {
                max_requests: env_parse("VIEW_RATE_LIMIT_MAX")
                    .unwrap_or_else(default_view_rate_limit),
                window_seconds: env_parse("VIEW_RATE_LIMIT_WINDOW_SECS")
                    .unwrap_or_else(default_rate_limit_window),
            },
            rate_limit_failure_mode: if env_flag("RATE_LIMIT_FAIL_CLOSED", false) {
                FailureMode::FailClosed
            } else {
                FailureMode::FailOpen
            },
            like_key_ttl_days,
        };

        let reconcile = ReconcileConfig {
            cron_secret: std::env::var("CRON_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            batch_size: env_parse("RECONCILE_BATCH_SIZE")
                .filter(|size: &usize| *size > 0)
                .unwrap_or_else(default_batch_size),
            scan_count: env_parse("RECONCILE_SCAN_COUNT")
                .filter(|count: &usize| *count > 0)
                .unwrap_or_else(default_scan_count),
            like_key_ttl_days,
        };

        Ok(Config {
            app,
            database,
            redis,
            engagement,
            reconcile,
        })
    }
}
