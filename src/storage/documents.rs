use super::schema::Database;
use super::types::{CachedDocument, DocumentCacheStats, StorageError};

impl Database {
    // ========================================================================
    // Document Cache Operations
    // ========================================================================

    /// Fetch a cached document by paper id.
    pub async fn get_document(
        &self,
        paper_id: &str,
    ) -> Result<Option<CachedDocument>, StorageError> {
        let row: Option<(Vec<u8>, i64, i64)> = sqlx::query_as(
            "SELECT data, cached_at, size_bytes FROM documents WHERE paper_id = ?",
        )
        .bind(paper_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(data, cached_at, size_bytes)| CachedDocument {
            paper_id: paper_id.to_string(),
            data,
            cached_at,
            size_bytes,
        }))
    }

    /// True if a document is cached for this paper id. Cheaper than
    /// [`get_document`](Self::get_document) since it does not load the blob.
    pub async fn is_document_cached(&self, paper_id: &str) -> Result<bool, StorageError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM documents WHERE paper_id = ?")
                .bind(paper_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Store a document, replacing any previous payload for the same id.
    pub async fn put_document(
        &self,
        paper_id: &str,
        data: &[u8],
        cached_at: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO documents (paper_id, data, cached_at, size_bytes)
            VALUES (?, ?, ?, ?)
        "#,
        )
        .bind(paper_id)
        .bind(data)
        .bind(cached_at)
        .bind(data.len() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete one cached document. Idempotent; eviction in this design is
    /// explicit, there is no TTL.
    pub async fn delete_document(&self, paper_id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM documents WHERE paper_id = ?")
            .bind(paper_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Aggregate entry count and byte size of the document cache.
    pub async fn document_cache_stats(&self) -> Result<DocumentCacheStats, StorageError> {
        let row: (i64, Option<i64>) =
            sqlx::query_as("SELECT COUNT(*), SUM(size_bytes) FROM documents")
                .fetch_one(&self.pool)
                .await?;

        Ok(DocumentCacheStats {
            total_entries: row.0,
            total_size_bytes: row.1.unwrap_or(0),
        })
    }

    /// Evict oldest-cached documents until the cache fits under `max_bytes`,
    /// keeping `keep_id` regardless of its age.
    ///
    /// Returns the number of entries evicted. There is no TTL; the size cap
    /// is the only growth bound on the document cache.
    pub async fn evict_documents_over(
        &self,
        max_bytes: i64,
        keep_id: &str,
    ) -> Result<u64, StorageError> {
        let mut evicted = 0u64;

        loop {
            let stats = self.document_cache_stats().await?;
            if stats.total_size_bytes <= max_bytes {
                break;
            }

            let victim: Option<(String,)> = sqlx::query_as(
                r#"
                SELECT paper_id FROM documents
                WHERE paper_id != ?
                ORDER BY cached_at ASC
                LIMIT 1
            "#,
            )
            .bind(keep_id)
            .fetch_optional(&self.pool)
            .await?;

            let Some((paper_id,)) = victim else {
                // Only the kept entry remains; nothing more we can drop.
                break;
            };

            self.delete_document(&paper_id).await?;
            evicted += 1;
            tracing::debug!(paper_id = %paper_id, "Evicted cached document over size cap");
        }

        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn document_round_trip() {
        let db = test_db().await;
        let payload = vec![0x25, 0x50, 0x44, 0x46]; // %PDF
        db.put_document("2401.00001", &payload, 1700000000)
            .await
            .unwrap();

        let doc = db.get_document("2401.00001").await.unwrap().unwrap();
        assert_eq!(doc.data, payload);
        assert_eq!(doc.size_bytes, 4);
        assert_eq!(doc.cached_at, 1700000000);
        assert!(db.is_document_cached("2401.00001").await.unwrap());
    }

    #[tokio::test]
    async fn missing_document_is_none() {
        let db = test_db().await;
        assert!(db.get_document("nope").await.unwrap().is_none());
        assert!(!db.is_document_cached("nope").await.unwrap());
    }

    #[tokio::test]
    async fn put_replaces_payload() {
        let db = test_db().await;
        db.put_document("p", b"old", 100).await.unwrap();
        db.put_document("p", b"newer", 200).await.unwrap();

        let doc = db.get_document("p").await.unwrap().unwrap();
        assert_eq!(doc.data, b"newer");
        assert_eq!(doc.size_bytes, 5);

        let stats = db.document_cache_stats().await.unwrap();
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let db = test_db().await;
        db.put_document("p", b"data", 100).await.unwrap();
        db.delete_document("p").await.unwrap();
        db.delete_document("p").await.unwrap();
        assert!(db.get_document("p").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stats_sum_sizes() {
        let db = test_db().await;
        db.put_document("a", &[0u8; 10], 100).await.unwrap();
        db.put_document("b", &[0u8; 30], 200).await.unwrap();

        let stats = db.document_cache_stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_size_bytes, 40);
    }

    #[tokio::test]
    async fn eviction_drops_oldest_first_and_keeps_pinned() {
        let db = test_db().await;
        db.put_document("oldest", &[0u8; 40], 100).await.unwrap();
        db.put_document("middle", &[0u8; 40], 200).await.unwrap();
        db.put_document("newest", &[0u8; 40], 300).await.unwrap();

        // Cap of 90 bytes forces one eviction; "oldest" goes first.
        let evicted = db.evict_documents_over(90, "newest").await.unwrap();
        assert_eq!(evicted, 1);
        assert!(!db.is_document_cached("oldest").await.unwrap());
        assert!(db.is_document_cached("middle").await.unwrap());
        assert!(db.is_document_cached("newest").await.unwrap());
    }

    #[tokio::test]
    async fn eviction_never_drops_kept_entry() {
        let db = test_db().await;
        db.put_document("only", &[0u8; 100], 100).await.unwrap();

        let evicted = db.evict_documents_over(10, "only").await.unwrap();
        assert_eq!(evicted, 0);
        assert!(db.is_document_cached("only").await.unwrap());
    }
}
