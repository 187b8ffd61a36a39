//! Local-first paper feed engine: feed synchronization with per-item user
//! state preservation, query-fingerprinted snapshot caching, background
//! refresh under connectivity constraints, and a cache-first binary
//! document store.
//!
//! The rendering layer and the upstream query/XML normalization live
//! elsewhere; this crate owns the storage and reconciliation semantics.

pub mod config;
pub mod connectivity;
pub mod docs;
pub mod feed;
pub mod query;
pub mod storage;
pub mod sync;

pub use connectivity::ConnectivityMonitor;
pub use query::FeedQuery;
pub use storage::Database;
pub use sync::{FeedSync, RefreshScheduler, SyncError, ViewMode};
