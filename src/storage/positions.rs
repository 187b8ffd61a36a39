use super::schema::Database;
use super::types::{StorageError, ViewPosition};

impl Database {
    // ========================================================================
    // View Position Operations
    // ========================================================================

    /// Saved scroll/zoom position for a document, if any.
    pub async fn get_view_position(
        &self,
        paper_id: &str,
    ) -> Result<Option<ViewPosition>, StorageError> {
        let row: Option<ViewPosition> = sqlx::query_as(
            "SELECT scroll_offset, page, zoom FROM view_positions WHERE paper_id = ?",
        )
        .bind(paper_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Persist the scroll/zoom position for a document.
    pub async fn save_view_position(
        &self,
        paper_id: &str,
        position: &ViewPosition,
        now: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO view_positions
                (paper_id, scroll_offset, page, zoom, updated_at)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(paper_id)
        .bind(position.scroll_offset)
        .bind(position.page)
        .bind(position.zoom)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn position_round_trip() {
        let db = Database::open(":memory:").await.unwrap();
        assert!(db.get_view_position("p").await.unwrap().is_none());

        let pos = ViewPosition {
            scroll_offset: 1520.5,
            page: 7,
            zoom: 1.25,
        };
        db.save_view_position("p", &pos, 1700000000).await.unwrap();
        assert_eq!(db.get_view_position("p").await.unwrap(), Some(pos));

        // Replace
        let pos2 = ViewPosition {
            scroll_offset: 0.0,
            page: 1,
            zoom: 1.0,
        };
        db.save_view_position("p", &pos2, 1700000060).await.unwrap();
        assert_eq!(db.get_view_position("p").await.unwrap(), Some(pos2));
    }
}
