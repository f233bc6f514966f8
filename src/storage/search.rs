use super::schema::Database;
use super::types::{now_iso, ArticleSummary, StoreError, SummaryRow};

/// Maximum search term length. Longer terms are operator error, and FTS5
/// wildcard expansion cost grows with input size.
const MAX_TERM_LENGTH: usize = 256;

/// Guard raw user terms before they reach the FTS5 parser.
pub(crate) fn validate_term(term: &str) -> Result<(), StoreError> {
    if term.len() > MAX_TERM_LENGTH {
        return Err(StoreError::InvalidInput(format!(
            "search term exceeds maximum length of {MAX_TERM_LENGTH} characters"
        )));
    }
    Ok(())
}

impl Database {
    // ========================================================================
    // Search
    // ========================================================================

    /// Public full-text search over title, description, and body.
    ///
    /// Only visible articles match: published, with `publish_at` absent or
    /// in the past. Results are ranked by the engine's default relevance
    /// (bm25), ties broken by most recent update. Terms that trip the FTS5
    /// syntax parser fall back to a plain substring scan so a stray quote
    /// never turns into an error page.
    pub async fn search_articles(&self, term: &str) -> Result<Vec<ArticleSummary>, StoreError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        validate_term(term)?;

        let now = now_iso();
        let fts_result: Result<Vec<SummaryRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT a.id, a.slug, a.title, a.description, a.department, a.status,
                   a.created_at, a.updated_at, a.image_url, a.image_x, a.image_y
            FROM articles_fts f
            JOIN articles a ON a.id = f.rowid
            WHERE f MATCH ?
              AND a.status = 'published'
              AND (a.publish_at IS NULL OR a.publish_at <= ?)
            ORDER BY f.rank, a.updated_at DESC
            "#,
        )
        .bind(term)
        .bind(&now)
        .fetch_all(&self.pool)
        .await;

        let rows = match fts_result {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, term = %term, "FTS5 search failed, falling back to LIKE");
                let like_pattern = format!("%{}%", term);
                sqlx::query_as(
                    r#"
                    SELECT id, slug, title, description, department, status,
                           created_at, updated_at, image_url, image_x, image_y
                    FROM articles
                    WHERE (title LIKE ?1 OR description LIKE ?1)
                      AND status = 'published'
                      AND (publish_at IS NULL OR publish_at <= ?2)
                    ORDER BY updated_at DESC
                    "#,
                )
                .bind(&like_pattern)
                .bind(&now)
                .fetch_all(&self.pool)
                .await?
            }
        };

        self.attach_tags(rows).await
    }

    // ========================================================================
    // Index Maintenance
    // ========================================================================

    /// Rebuild the search index from the articles table.
    ///
    /// The index is a standalone FTS5 table kept in sync by triggers, so a
    /// rebuild is delete-and-repopulate inside one transaction. Returns the
    /// number of articles indexed.
    pub async fn rebuild_search_index(&self) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM articles_fts")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO articles_fts(rowid, title, description, content, slug)
            SELECT id, title, description, content_html, slug FROM articles
            "#,
        )
        .execute(&mut *tx)
        .await?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(count as usize)
    }

    /// Compare the search index against the articles table.
    ///
    /// Detects orphaned index rows (no matching article) and missing ones
    /// (article never indexed) — both symptoms of a bypassed trigger, e.g.
    /// after manual surgery on the file.
    pub async fn check_search_consistency(&self) -> Result<SearchConsistencyReport, StoreError> {
        let (articles_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        let (indexed_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles_fts")
            .fetch_one(&self.pool)
            .await?;

        let (orphaned,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM articles_fts f \
             LEFT JOIN articles a ON f.rowid = a.id WHERE a.id IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        let (missing,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM articles a \
             LEFT JOIN articles_fts f ON a.id = f.rowid WHERE f.rowid IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        let is_consistent = orphaned == 0 && missing == 0 && articles_count == indexed_count;
        tracing::debug!(
            articles = articles_count,
            indexed = indexed_count,
            orphaned = orphaned,
            missing = missing,
            is_consistent = is_consistent,
            "search index consistency check"
        );

        Ok(SearchConsistencyReport {
            articles_count,
            indexed_count,
            orphaned_entries: orphaned,
            missing_entries: missing,
            is_consistent,
        })
    }
}

/// Search index health relative to the articles table.
#[derive(Debug)]
pub struct SearchConsistencyReport {
    pub articles_count: i64,
    pub indexed_count: i64,
    /// Index rows with no corresponding article
    pub orphaned_entries: i64,
    /// Articles with no corresponding index row
    pub missing_entries: i64,
    pub is_consistent: bool,
}
