use super::schema::Database;
use super::types::{NewQuickLink, QuickLink, StoreError};

impl Database {
    // ========================================================================
    // Quick Links
    // ========================================================================

    /// All quick links in insertion order.
    pub async fn list_quick_links(&self) -> Result<Vec<QuickLink>, StoreError> {
        let links: Vec<QuickLink> = sqlx::query_as(
            "SELECT id, title, href, description, position FROM quick_links \
             ORDER BY position ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    /// Append a quick link, returning the stored row.
    ///
    /// Positions grow monotonically (max + 1) and are never reused after a
    /// delete; the subselect computes the next one inside the same insert,
    /// so there is no read-then-write window.
    pub async fn create_quick_link(&self, link: &NewQuickLink) -> Result<QuickLink, StoreError> {
        if link.title.trim().is_empty() {
            return Err(StoreError::InvalidInput("title is required".to_string()));
        }
        if link.href.trim().is_empty() {
            return Err(StoreError::InvalidInput("href is required".to_string()));
        }

        let created: QuickLink = sqlx::query_as(
            r#"
            INSERT INTO quick_links(title, href, description, position)
            VALUES (?, ?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM quick_links))
            RETURNING id, title, href, description, position
            "#,
        )
        .bind(&link.title)
        .bind(&link.href)
        .bind(&link.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Delete a quick link. Unknown ids are a no-op success.
    pub async fn delete_quick_link(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM quick_links WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
