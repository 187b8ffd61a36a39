use super::schema::Database;
use super::types::{FeedSnapshot, SnapshotMeta, StorageError};

impl Database {
    // ========================================================================
    // Feed Snapshot Operations
    // ========================================================================

    /// Read the snapshot for one query fingerprint, if any.
    pub async fn get_snapshot(
        &self,
        fingerprint: &str,
    ) -> Result<Option<FeedSnapshot>, StorageError> {
        let row: Option<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT paper_ids, last_refresh, total_results
            FROM feed_snapshots
            WHERE fingerprint = ?
        "#,
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(ids_json, last_refresh, total_results)| {
            let paper_ids: Vec<String> =
                serde_json::from_str(&ids_json).map_err(|e| StorageError::CorruptRecord {
                    id: fingerprint.to_string(),
                    detail: format!("paper_ids column: {e}"),
                })?;
            Ok(FeedSnapshot {
                fingerprint: fingerprint.to_string(),
                paper_ids,
                meta: SnapshotMeta {
                    last_refresh,
                    total_results,
                },
            })
        })
        .transpose()
    }

    /// Replace the snapshot for a fingerprint.
    ///
    /// A refresh is all-or-nothing per fingerprint: the whole row is swapped
    /// in one statement, so readers see either the old list or the new one,
    /// never a partial update.
    pub async fn put_snapshot(
        &self,
        fingerprint: &str,
        paper_ids: &[String],
        meta: &SnapshotMeta,
    ) -> Result<(), StorageError> {
        let ids_json = serde_json::to_string(paper_ids).unwrap_or_else(|_| "[]".into());

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO feed_snapshots
                (fingerprint, paper_ids, last_refresh, total_results)
            VALUES (?, ?, ?, ?)
        "#,
        )
        .bind(fingerprint)
        .bind(&ids_json)
        .bind(meta.last_refresh)
        .bind(meta.total_results)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// When the snapshot for this fingerprint was last refreshed.
    pub async fn snapshot_last_refresh(
        &self,
        fingerprint: &str,
    ) -> Result<Option<i64>, StorageError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_refresh FROM feed_snapshots WHERE fingerprint = ?")
                .bind(fingerprint)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(ts,)| ts))
    }
}
