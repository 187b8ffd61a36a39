use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-layer errors. These surface to callers uncaught: the store never
/// retries internally, and a failed write means "the action did not persist".
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another instance of papershelf has the database locked
    #[error("Another instance of papershelf appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A JSON column held data we could not decode
    #[error("Corrupt record for '{id}': {detail}")]
    CorruptRecord { id: String, detail: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StorageError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StorageError::InstanceLocked;
        }

        StorageError::Other(err)
    }
}

// ============================================================================
// Paper Records
// ============================================================================

/// How far the user has gotten with a paper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    #[default]
    Unread,
    Skimmed,
    Read,
    Deep,
}

impl ReadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadStatus::Unread => "unread",
            ReadStatus::Skimmed => "skimmed",
            ReadStatus::Read => "read",
            ReadStatus::Deep => "deep",
        }
    }

    /// Unknown values fall back to `Unread` rather than failing the whole
    /// row load; a bad status is not worth losing a record over.
    pub fn parse(s: &str) -> Self {
        match s {
            "skimmed" => ReadStatus::Skimmed,
            "read" => ReadStatus::Read,
            "deep" => ReadStatus::Deep,
            _ => ReadStatus::Unread,
        }
    }
}

/// One paper record: descriptive fields replaced wholesale by each refresh,
/// user-state fields (`status`, `bookmarked`, `bookmarked_at`, `note`)
/// mutable only through explicit user actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    /// Upstream publication date, unix seconds.
    pub published: Option<i64>,
    pub primary_category: Option<String>,
    pub categories: Vec<String>,
    pub url: Option<String>,
    pub pdf_url: Option<String>,

    // User state
    pub status: ReadStatus,
    pub bookmarked: bool,
    /// When the bookmark was last set; drives reading-list ordering.
    pub bookmarked_at: Option<i64>,
    pub note: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Internal row type for paper queries. List-valued fields live in JSON
/// columns; `into_paper` decodes them.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PaperRow {
    pub id: String,
    pub title: String,
    pub authors: String,
    pub abstract_text: String,
    pub published: Option<i64>,
    pub primary_category: Option<String>,
    pub categories: String,
    pub url: Option<String>,
    pub pdf_url: Option<String>,
    pub status: String,
    pub bookmarked: bool,
    pub bookmarked_at: Option<i64>,
    pub note: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PaperRow {
    pub(crate) fn into_paper(self) -> Result<Paper, StorageError> {
        let authors: Vec<String> =
            serde_json::from_str(&self.authors).map_err(|e| StorageError::CorruptRecord {
                id: self.id.clone(),
                detail: format!("authors column: {e}"),
            })?;
        let categories: Vec<String> =
            serde_json::from_str(&self.categories).map_err(|e| StorageError::CorruptRecord {
                id: self.id.clone(),
                detail: format!("categories column: {e}"),
            })?;
        Ok(Paper {
            id: self.id,
            title: self.title,
            authors,
            abstract_text: self.abstract_text,
            published: self.published,
            primary_category: self.primary_category,
            categories,
            url: self.url,
            pdf_url: self.pdf_url,
            status: ReadStatus::parse(&self.status),
            bookmarked: self.bookmarked,
            bookmarked_at: self.bookmarked_at,
            note: self.note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Outcome of an update-or-insert on the paper store. An explicit variant,
/// not a thrown-and-caught "not found" branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

// ============================================================================
// Feed Snapshots
// ============================================================================

/// Metadata stored alongside one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// Completion time of the fetch that produced this snapshot, unix seconds.
    pub last_refresh: i64,
    /// Total result count reported by the upstream query (informational).
    pub total_results: i64,
}

/// The persisted result list for one fingerprint as of its last successful
/// fetch: ordered item ids plus metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub fingerprint: String,
    pub paper_ids: Vec<String>,
    pub meta: SnapshotMeta,
}

// ============================================================================
// Document Cache
// ============================================================================

/// One cached binary document.
#[derive(Debug, Clone)]
pub struct CachedDocument {
    pub paper_id: String,
    pub data: Vec<u8>,
    pub cached_at: i64,
    pub size_bytes: i64,
}

/// Aggregate statistics over the document cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentCacheStats {
    pub total_entries: i64,
    pub total_size_bytes: i64,
}

// ============================================================================
// View Positions
// ============================================================================

/// Per-document scroll/zoom state, persisted independently of sync.
#[derive(Debug, Clone, Copy, PartialEq, sqlx::FromRow)]
pub struct ViewPosition {
    pub scroll_offset: f64,
    pub page: i64,
    pub zoom: f64,
}
