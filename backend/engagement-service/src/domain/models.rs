use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque video identifier owned by the catalog. Embedded verbatim in cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque user identifier issued by the surrounding application's auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity of whoever is calling into the engine, supplied by the surrounding
/// application's session layer.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user_id: Option<UserId>,
    pub client_ip: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            client_ip: None,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }
}

/// Publication state of a video. Only published videos can be liked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    Draft,
    Processing,
    Published,
    Rejected,
    Archived,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Draft => "DRAFT",
            VideoStatus::Processing => "PROCESSING",
            VideoStatus::Published => "PUBLISHED",
            VideoStatus::Rejected => "REJECTED",
            VideoStatus::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(VideoStatus::Draft),
            "PROCESSING" => Ok(VideoStatus::Processing),
            "PUBLISHED" => Ok(VideoStatus::Published),
            "REJECTED" => Ok(VideoStatus::Rejected),
            "ARCHIVED" => Ok(VideoStatus::Archived),
            other => Err(format!("unknown video status: {}", other)),
        }
    }
}

/// Durable snapshot of a video's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: VideoId,
    pub status: VideoStatus,
    pub likes_count: i64,
    pub views_count: i64,
}

/// Answer returned by both the toggle and the read path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeStatus {
    pub liked: bool,
    pub count: i64,
}

impl LikeStatus {
    pub fn new(liked: bool, count: i64) -> Self {
        Self {
            liked,
            count: count.max(0),
        }
    }

    /// What the read path degrades to on internal errors
    pub fn unknown() -> Self {
        Self {
            liked: false,
            count: 0,
        }
    }
}

/// Counter families mirrored from the cache into the durable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    Likes,
    Views,
}

impl CounterKind {
    pub fn label(&self) -> &'static str {
        match self {
            CounterKind::Likes => "likes",
            CounterKind::Views => "views",
        }
    }
}
