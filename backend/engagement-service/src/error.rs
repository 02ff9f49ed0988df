/// Error types for engagement-service
///
/// Hot-path errors (`EngagementError`) are surfaced to the surrounding web application,
/// which can return them directly as HTTP responses. Reconciliation trigger errors
/// (`CronError`) are only ever seen by the external scheduler.
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::domain::{VideoId, VideoStatus};

/// Fast cache failures
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[source] redis::RedisError),

    /// The server could not be reached: refused, dropped or timed out
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected cache reply: {0}")]
    Protocol(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal()
            || e.is_connection_dropped()
            || e.is_timeout()
            || e.is_io_error()
        {
            CacheError::Unavailable(e.to_string())
        } else {
            CacheError::Redis(e)
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Errors returned by the like/view engine
#[derive(Error, Debug)]
pub enum EngagementError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Video not found: {0}")]
    NotFound(VideoId),

    #[error("Video {video_id} cannot be liked in state {status}")]
    InvalidState {
        video_id: VideoId,
        status: VideoStatus,
    },

    #[error("Failed to toggle like: {0}")]
    ToggleFailed(#[source] CacheError),

    #[error("Failed to record view: {0}")]
    ViewFailed(#[source] CacheError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngagementError {
    /// Whether the caller may simply retry the same call
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngagementError::RateLimited { .. }
                | EngagementError::ToggleFailed(_)
                | EngagementError::ViewFailed(_)
        )
    }

    fn code(&self) -> &'static str {
        match self {
            EngagementError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            EngagementError::RateLimited { .. } => "RATE_LIMITED",
            EngagementError::NotFound(_) => "NOT_FOUND",
            EngagementError::InvalidState { .. } => "INVALID_STATE",
            EngagementError::ToggleFailed(_) => "TOGGLE_FAILED",
            EngagementError::ViewFailed(_) => "VIEW_FAILED",
            EngagementError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for EngagementError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngagementError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            EngagementError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            EngagementError::NotFound(_) => StatusCode::NOT_FOUND,
            EngagementError::InvalidState { .. } => StatusCode::CONFLICT,
            EngagementError::ToggleFailed(_) | EngagementError::ViewFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EngagementError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let EngagementError::RateLimited { retry_after_secs } = self {
            builder.insert_header(("Retry-After", retry_after_secs.to_string()));
        }
        builder.json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
            "retryable": self.is_retryable(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
    }
}

/// Errors returned by the reconciliation trigger endpoint
#[derive(Error, Debug)]
pub enum CronError {
    #[error("Server misconfigured")]
    ServerMisconfigured,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Counter sync failed: {0}")]
    Job(#[from] CacheError),
}

impl ResponseError for CronError {
    fn status_code(&self) -> StatusCode {
        match self {
            CronError::Unauthorized => StatusCode::UNAUTHORIZED,
            CronError::ServerMisconfigured | CronError::Job(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
    }
}
