mod documents;
mod papers;
mod positions;
mod schema;
mod snapshots;
mod types;

pub use papers::new_paper;
pub use schema::Database;
pub use types::{
    CachedDocument, DocumentCacheStats, FeedSnapshot, Paper, ReadStatus, SnapshotMeta,
    StorageError, UpsertOutcome, ViewPosition,
};
