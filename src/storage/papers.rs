use super::schema::Database;
use super::types::{Paper, PaperRow, ReadStatus, StorageError, UpsertOutcome};

const SELECT_PAPER: &str = r#"
    SELECT id, title, authors, abstract_text, published, primary_category,
           categories, url, pdf_url, status, bookmarked, bookmarked_at, note,
           created_at, updated_at
    FROM papers
"#;

impl Database {
    // ========================================================================
    // Paper Record Operations
    // ========================================================================

    /// Get one paper record by id.
    pub async fn get_paper(&self, id: &str) -> Result<Option<Paper>, StorageError> {
        let row: Option<PaperRow> =
            sqlx::query_as(&format!("{SELECT_PAPER} WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(PaperRow::into_paper).transpose()
    }

    /// Write a paper record, replacing any existing row for the same id.
    ///
    /// This is a full replace (last-write-wins on the whole record).
    /// Preserving user state across a refresh is the sync engine's
    /// responsibility, not the store's.
    pub async fn put_paper(&self, paper: &Paper) -> Result<(), StorageError> {
        let authors = serde_json::to_string(&paper.authors).unwrap_or_else(|_| "[]".into());
        let categories = serde_json::to_string(&paper.categories).unwrap_or_else(|_| "[]".into());

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO papers
                (id, title, authors, abstract_text, published, primary_category,
                 categories, url, pdf_url, status, bookmarked, bookmarked_at, note,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&paper.id)
        .bind(&paper.title)
        .bind(&authors)
        .bind(&paper.abstract_text)
        .bind(paper.published)
        .bind(&paper.primary_category)
        .bind(&categories)
        .bind(&paper.url)
        .bind(&paper.pdf_url)
        .bind(paper.status.as_str())
        .bind(paper.bookmarked)
        .bind(paper.bookmarked_at)
        .bind(&paper.note)
        .bind(paper.created_at)
        .bind(paper.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Write a paper record, reporting whether a row already existed.
    ///
    /// Same full-replace semantics as [`put_paper`](Self::put_paper); the
    /// explicit outcome lets callers distinguish the update-or-insert paths
    /// without probing for a "not found" failure.
    pub async fn upsert_paper(&self, paper: &Paper) -> Result<UpsertOutcome, StorageError> {
        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM papers WHERE id = ?")
            .bind(&paper.id)
            .fetch_optional(&self.pool)
            .await?;

        self.put_paper(paper).await?;

        Ok(match existing {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }

    /// Delete one paper record. Idempotent.
    pub async fn delete_paper(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM papers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All paper records, most recently updated first.
    pub async fn list_papers(&self) -> Result<Vec<Paper>, StorageError> {
        let rows: Vec<PaperRow> =
            sqlx::query_as(&format!("{SELECT_PAPER} ORDER BY updated_at DESC"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(PaperRow::into_paper).collect()
    }

    /// The reading-list projection: bookmarked papers, most recently
    /// bookmarked first. Derived on every call, never stored separately.
    pub async fn reading_list(&self) -> Result<Vec<Paper>, StorageError> {
        let rows: Vec<PaperRow> = sqlx::query_as(&format!(
            "{SELECT_PAPER} WHERE bookmarked = 1 ORDER BY bookmarked_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PaperRow::into_paper).collect()
    }

    /// Hydrate records for an ordered id list, preserving the input order.
    /// Ids with no stored record are skipped.
    pub async fn get_papers_ordered(&self, ids: &[String]) -> Result<Vec<Paper>, StorageError> {
        let mut papers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(paper) = self.get_paper(id).await? {
                papers.push(paper);
            }
        }
        Ok(papers)
    }
}

/// Build a paper with default user state (unread, not bookmarked, no note).
pub fn new_paper(id: impl Into<String>, title: impl Into<String>, now: i64) -> Paper {
    Paper {
        id: id.into(),
        title: title.into(),
        authors: Vec::new(),
        abstract_text: String::new(),
        published: None,
        primary_category: None,
        categories: Vec::new(),
        url: None,
        pdf_url: None,
        status: ReadStatus::Unread,
        bookmarked: false,
        bookmarked_at: None,
        note: None,
        created_at: now,
        updated_at: now,
    }
}
