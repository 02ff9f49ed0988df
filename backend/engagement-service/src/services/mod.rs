pub mod likes;
pub mod page_cache;
pub mod rate_limit;
pub mod reconcile;

pub use likes::LikeService;
pub use page_cache::{NoopInvalidator, PageInvalidator, PubSubInvalidator};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use reconcile::{CounterReconciler, FamilyReport, ReconcileReport};
