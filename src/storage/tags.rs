use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::schema::Database;
use super::types::StoreError;

// ============================================================================
// Tag Resolver
// ============================================================================
//
// Tags are a get-or-create set keyed by exact (case-sensitive, trimmed)
// name, related to articles through the article_tags join table. The
// helpers here take a `&mut SqliteConnection` so they compose into the
// article store's transactions — linking tags is never atomic on its own,
// it is atomic with the article write that owns it.

/// Get-or-create a tag, returning its id.
///
/// Trims the name; empty names are rejected before any write.
pub(crate) async fn resolve_tag(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<i64, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput(
            "tag name cannot be empty".to_string(),
        ));
    }

    sqlx::query("INSERT INTO tags(name) VALUES (?) ON CONFLICT(name) DO NOTHING")
        .bind(trimmed)
        .execute(&mut *conn)
        .await?;

    let (id,): (i64,) = sqlx::query_as("SELECT id FROM tags WHERE name = ?")
        .bind(trimmed)
        .fetch_one(&mut *conn)
        .await?;

    Ok(id)
}

/// Link the given tag names to an article, resolving each through
/// [`resolve_tag`]. Blank entries are skipped; duplicates collapse on the
/// join table's primary key.
pub(crate) async fn link_tags(
    conn: &mut SqliteConnection,
    article_id: i64,
    names: &[String],
) -> Result<(), StoreError> {
    for name in names {
        if name.trim().is_empty() {
            continue;
        }
        let tag_id = resolve_tag(conn, name).await?;
        sqlx::query("INSERT OR IGNORE INTO article_tags(article_id, tag_id) VALUES (?, ?)")
            .bind(article_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Fully replace an article's tag relation set.
pub(crate) async fn replace_article_tags(
    conn: &mut SqliteConnection,
    article_id: i64,
    names: &[String],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(article_id)
        .execute(&mut *conn)
        .await?;
    link_tags(conn, article_id, names).await
}

/// Tag names related to one article. Retrieval order is whatever the
/// database returns — not part of the contract.
pub(crate) async fn tags_for_article(
    conn: &mut SqliteConnection,
    article_id: i64,
) -> Result<Vec<String>, StoreError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT t.name FROM tags t
        JOIN article_tags at ON at.tag_id = t.id
        WHERE at.article_id = ?
        "#,
    )
    .bind(article_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Tag names for a batch of articles in one query, grouped by article id.
/// Listing queries use this instead of per-row lookups or string-aggregated
/// joins.
pub(crate) async fn tags_by_article(
    db: &Database,
    article_ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>, StoreError> {
    if article_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT at.article_id, t.name FROM article_tags at \
         JOIN tags t ON t.id = at.tag_id WHERE at.article_id IN (",
    );
    let mut separated = builder.separated(", ");
    for id in article_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let rows: Vec<(i64, String)> = builder.build_query_as().fetch_all(&db.pool).await?;

    let mut grouped: HashMap<i64, Vec<String>> = HashMap::new();
    for (article_id, name) in rows {
        grouped.entry(article_id).or_default().push(name);
    }
    Ok(grouped)
}

impl Database {
    /// Get-or-create a tag by name, returning its id.
    pub async fn resolve_tag(&self, name: &str) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        resolve_tag(&mut conn, name).await
    }

    /// Fully replace an article's tag set in one transaction.
    ///
    /// The article store's create/update/revert paths do this as part of
    /// their own transactions; this entry point covers callers that only
    /// retag.
    pub async fn replace_tags(&self, slug: &str, names: &[String]) -> Result<(), StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM articles WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        let Some((article_id,)) = row else {
            return Err(StoreError::NotFound("article"));
        };

        let mut tx = self.pool.begin().await?;
        replace_article_tags(&mut tx, article_id, names).await?;
        tx.commit().await?;
        Ok(())
    }
}
