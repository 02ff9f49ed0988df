//! Cache key scheme shared with every deployment that reads these counters.
//!
//! Keys:
//! - `video:{video_id}:like_count` integer counter
//! - `video:{video_id}:view_count` integer counter
//! - `video:{video_id}:likes` set of user ids
//! - `user:{user_id}:like:{video_id}` membership marker

use crate::domain::{CounterKind, UserId, VideoId};

const VIDEO_PREFIX: &str = "video:";
const LIKE_COUNT_SUFFIX: &str = ":like_count";
const VIEW_COUNT_SUFFIX: &str = ":view_count";

pub fn like_count(video_id: &VideoId) -> String {
    format!("video:{}:like_count", video_id)
}

pub fn view_count(video_id: &VideoId) -> String {
    format!("video:{}:view_count", video_id)
}

pub fn liked_by(video_id: &VideoId) -> String {
    format!("video:{}:likes", video_id)
}

pub fn like_marker(user_id: &UserId, video_id: &VideoId) -> String {
    format!("user:{}:like:{}", user_id, video_id)
}

/// SCAN MATCH pattern for a counter family
pub fn counter_pattern(kind: CounterKind) -> &'static str {
    match kind {
        CounterKind::Likes => "video:*:like_count",
        CounterKind::Views => "video:*:view_count",
    }
}

/// Extract the embedded video id from a counter key, `None` when the key does not
/// belong to the family or carries an empty id.
pub fn parse_counter_key(kind: CounterKind, key: &str) -> Option<VideoId> {
    let suffix = match kind {
        CounterKind::Likes => LIKE_COUNT_SUFFIX,
        CounterKind::Views => VIEW_COUNT_SUFFIX,
    };

    let id = key.strip_prefix(VIDEO_PREFIX)?.strip_suffix(suffix)?;
    if id.is_empty() {
        return None;
    }
    Some(VideoId::from(id))
}
