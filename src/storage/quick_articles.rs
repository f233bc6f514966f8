use super::schema::Database;
use super::types::{PinnedArticle, PinnedRow, StoreError};

/// Homepage slot capacity. Positions are always drawn from
/// `0..MAX_PINNED_ARTICLES`, each used at most once.
pub const MAX_PINNED_ARTICLES: usize = 3;

impl Database {
    // ========================================================================
    // Pinned Articles (homepage quick slots)
    // ========================================================================

    /// Whether the article occupies a homepage slot. Unknown slugs are
    /// simply "not pinned".
    pub async fn is_pinned(&self, slug: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM quick_articles qa
            JOIN articles a ON a.id = qa.article_id
            WHERE a.slug = ?
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Pin an article to the lowest free homepage slot.
    ///
    /// Already-pinned articles are a no-op success. All three slots taken
    /// is a `Conflict`. Picking the lowest free position (rather than
    /// reusing whatever past order) keeps the homepage cards compact and
    /// stable. Check and insert share one transaction.
    pub async fn pin_article(&self, slug: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM articles WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((article_id,)) = row else {
            return Err(StoreError::NotFound("article"));
        };

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM quick_articles WHERE article_id = ?")
                .bind(article_id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Ok(());
        }

        let taken: Vec<(i64,)> = sqlx::query_as("SELECT position FROM quick_articles")
            .fetch_all(&mut *tx)
            .await?;
        if taken.len() >= MAX_PINNED_ARTICLES {
            return Err(StoreError::Conflict("max quick articles reached"));
        }
        let position = (0..MAX_PINNED_ARTICLES as i64)
            .find(|p| !taken.iter().any(|(t,)| t == p))
            .ok_or(StoreError::Conflict("max quick articles reached"))?;

        sqlx::query("INSERT INTO quick_articles(article_id, position) VALUES (?, ?)")
            .bind(article_id)
            .bind(position)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::conflict_on_unique(e, "max quick articles reached"))?;

        tx.commit().await?;
        tracing::debug!(slug = %slug, position, "article pinned");
        Ok(())
    }

    /// Remove an article's pin. Unknown or unpinned slugs are a no-op
    /// success, so callers can unpin blindly.
    pub async fn unpin_article(&self, slug: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM quick_articles
            WHERE article_id IN (SELECT id FROM articles WHERE slug = ?)
            "#,
        )
        .bind(slug)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All pinned articles joined with their live card attributes, slot
    /// order first to last.
    pub async fn list_pinned_articles(&self) -> Result<Vec<PinnedArticle>, StoreError> {
        let rows: Vec<PinnedRow> = sqlx::query_as(
            r#"
            SELECT a.slug, a.title, a.description, a.department,
                   a.image_url, a.image_x, a.image_y, qa.position
            FROM quick_articles qa
            JOIN articles a ON a.id = qa.article_id
            ORDER BY qa.position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PinnedRow::into_pinned).collect())
    }
}
