use sqlx::SqliteConnection;

use super::schema::Database;
use super::tags;
use super::types::{now_iso, StoreError, VersionEntry, VersionRow};

/// How many history entries a listing returns. The log itself is
/// append-only and uncapped; only retrieval truncates.
const VERSION_LIST_LIMIT: i64 = 10;

/// Row captured for a snapshot, before the update lands.
#[derive(Debug, sqlx::FromRow)]
struct SnapshotSource {
    slug: String,
    title: String,
    description: String,
    department: Option<String>,
    content_html: String,
    status: String,
    publish_at: Option<String>,
}

/// Append a snapshot of the article's current state to its version log.
///
/// Runs on the caller's connection so it commits (or rolls back) with the
/// update that triggered it. Tag names are serialized as a JSON array —
/// the snapshot must stay readable even after the live tag rows churn.
pub(crate) async fn snapshot_article(
    conn: &mut SqliteConnection,
    article_id: i64,
    now: &str,
) -> Result<(), StoreError> {
    let prev: SnapshotSource = sqlx::query_as(
        r#"
        SELECT slug, title, description, department, content_html, status, publish_at
        FROM articles WHERE id = ?
        "#,
    )
    .bind(article_id)
    .fetch_one(&mut *conn)
    .await?;

    let tag_names = tags::tags_for_article(conn, article_id).await?;
    let tags_json = serde_json::to_string(&tag_names)?;

    sqlx::query(
        r#"
        INSERT INTO article_versions (article_id, slug, title, description, department,
                                      content_html, status, publish_at, tags_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(article_id)
    .bind(&prev.slug)
    .bind(&prev.title)
    .bind(&prev.description)
    .bind(&prev.department)
    .bind(&prev.content_html)
    .bind(&prev.status)
    .bind(&prev.publish_at)
    .bind(&tags_json)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

impl Database {
    // ========================================================================
    // Version History
    // ========================================================================

    /// History entries for an article, newest first, capped for display.
    ///
    /// An unknown slug yields an empty list — history panels render the
    /// same way for "no article" and "no edits yet".
    pub async fn list_versions(&self, slug: &str) -> Result<Vec<VersionEntry>, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM articles WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        let Some((article_id,)) = row else {
            return Ok(Vec::new());
        };

        let entries: Vec<VersionEntry> = sqlx::query_as(
            r#"
            SELECT id, created_at, title FROM article_versions
            WHERE article_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(article_id)
        .bind(VERSION_LIST_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Restore an article to a snapshotted state, returning its slug.
    ///
    /// Overwrites slug, title, description, department, body, status,
    /// schedule, and the full tag set; `updated_at` is bumped to now. The
    /// state being overwritten is NOT itself snapshotted first — reverting
    /// away from an unsaved intermediate state loses it. That mirrors how
    /// editors use revert (rare, manual, "undo to a known point").
    pub async fn revert_to_version(&self, version_id: i64) -> Result<String, StoreError> {
        let version: Option<VersionRow> = sqlx::query_as(
            r#"
            SELECT article_id, slug, title, description, department,
                   content_html, status, publish_at, tags_json
            FROM article_versions WHERE id = ?
            "#,
        )
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(version) = version else {
            return Err(StoreError::NotFound("version"));
        };

        let tag_names: Vec<String> = match version.tags_json.as_deref() {
            Some(json) => serde_json::from_str(json)?,
            None => Vec::new(),
        };

        let now = now_iso();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE articles
            SET slug = ?, title = ?, description = ?, department = ?,
                content_html = ?, status = ?, publish_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&version.slug)
        .bind(&version.title)
        .bind(&version.description)
        .bind(&version.department)
        .bind(&version.content_html)
        .bind(&version.status)
        .bind(&version.publish_at)
        .bind(&now)
        .bind(version.article_id)
        .execute(&mut *tx)
        .await
        // The snapshotted slug may have been claimed by another article
        // since the snapshot was taken.
        .map_err(|e| StoreError::conflict_on_unique(e, "slug already exists"))?;

        tags::replace_article_tags(&mut tx, version.article_id, &tag_names).await?;
        tx.commit().await?;

        tracing::debug!(version_id, slug = %version.slug, "article reverted");
        Ok(version.slug)
    }
}
