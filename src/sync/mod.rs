//! Feed synchronization: the merge rule, the engine that applies it, and
//! the background refresh scheduler.

mod engine;
mod merge;
mod scheduler;

pub use engine::{FeedSync, FetchStats, SyncError, ViewMode};
pub use merge::reconcile;
pub use scheduler::{tick_decision, RefreshScheduler, TickDecision, DEFAULT_REFRESH_INTERVAL};
