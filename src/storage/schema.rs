use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StorageError;

// ============================================================================
// Database
// ============================================================================

/// Handle to the durable store: paper records, feed snapshots, cached
/// documents, and view positions. Cheap to clone (pool is internally
/// reference-counted); one shared instance per process.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InstanceLocked` if another instance of
    /// papershelf has the database locked (SQLITE_BUSY, SQLITE_LOCKED,
    /// SQLITE_CANTOPEN). Returns `StorageError::Migration` or
    /// `StorageError::Other` for everything else.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Handles transient contention between a
        // refresh cycle and a document write. pragma() makes every pooled
        // connection inherit the setting.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StorageError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; 5 connections covers peak concurrent
        // readers (feed hydration + document reads + view queries).
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StorageError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                StorageError::InstanceLocked
            } else {
                StorageError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All schema changes are wrapped in a single transaction so a failure
    /// mid-migration (disk full, power loss) rolls back to the previous
    /// consistent state. Every statement uses `IF NOT EXISTS`, so re-running
    /// on an existing database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        // Enable foreign keys (per-connection setting, outside the transaction)
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        // Paper records. Descriptive fields come from the upstream feed;
        // status/bookmarked/bookmarked_at/note are user state and are only
        // written through explicit user actions or the merge path.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS papers (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                authors TEXT NOT NULL DEFAULT '[]',
                abstract_text TEXT NOT NULL DEFAULT '',
                published INTEGER,
                primary_category TEXT,
                categories TEXT NOT NULL DEFAULT '[]',
                url TEXT,
                pdf_url TEXT,
                status TEXT NOT NULL DEFAULT 'unread',
                bookmarked INTEGER NOT NULL DEFAULT 0,
                bookmarked_at INTEGER,
                note TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // One snapshot row per query fingerprint: the ordered id list from
        // the most recent successful fetch, replaced whole on refresh.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_snapshots (
                fingerprint TEXT PRIMARY KEY,
                paper_ids TEXT NOT NULL,
                last_refresh INTEGER NOT NULL,
                total_results INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Binary document cache, keyed by paper id.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                paper_id TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                cached_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Per-document scroll/zoom position, independent of sync.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS view_positions (
                paper_id TEXT PRIMARY KEY,
                scroll_offset REAL NOT NULL DEFAULT 0,
                page INTEGER NOT NULL DEFAULT 1,
                zoom REAL NOT NULL DEFAULT 1.0,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Reading list is filtered by bookmarked and ordered by recency of
        // the bookmark; partial index covers exactly that query.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_papers_bookmarked
             ON papers(bookmarked_at DESC) WHERE bookmarked = 1",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_papers_status ON papers(status)")
            .execute(&mut *tx)
            .await?;

        // Eviction scans the document cache oldest-first.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_cached_at ON documents(cached_at)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
