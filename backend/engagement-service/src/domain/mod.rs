pub mod models;

pub use models::{
    Caller, CounterKind, LikeStatus, UserId, VideoId, VideoRecord, VideoStatus,
};
