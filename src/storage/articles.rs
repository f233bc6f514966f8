use sqlx::{QueryBuilder, Sqlite};

use super::schema::Database;
use super::tags;
use super::types::{
    now_iso, Article, ArticleFilter, ArticleInput, ArticleRow, ArticleSummary, SortKey,
    StatusFilter, StoreError, SummaryRow,
};
use super::versions;
use crate::slug;

/// Columns shared by every listing query.
const SUMMARY_COLUMNS: &str = "a.id, a.slug, a.title, a.description, a.department, a.status, \
     a.created_at, a.updated_at, a.image_url, a.image_x, a.image_y";

/// Reject inputs the HTTP layer is not trusted to have validated.
fn validate_input(input: &ArticleInput) -> Result<(), StoreError> {
    if input.title.trim().is_empty() {
        return Err(StoreError::InvalidInput("title is required".to_string()));
    }
    if input.description.trim().is_empty() {
        return Err(StoreError::InvalidInput(
            "description is required".to_string(),
        ));
    }
    if input.content_html.trim().is_empty() {
        return Err(StoreError::InvalidInput(
            "contentHtml is required".to_string(),
        ));
    }
    for offset in [input.image_x, input.image_y].into_iter().flatten() {
        if !offset.is_finite() {
            return Err(StoreError::InvalidInput(
                "image focal offsets must be finite numbers".to_string(),
            ));
        }
    }
    Ok(())
}

/// Resolve the slug for a write: an explicit slug must already be in the
/// URL-safe alphabet; a blank one falls back to the slugified title.
/// This is the enforcement point for the slug policy in [`crate::slug`].
fn effective_slug(input: &ArticleInput, fallback: Option<&str>) -> Result<String, StoreError> {
    let provided = input.slug.as_deref().map(str::trim).unwrap_or("");
    if !provided.is_empty() {
        if !slug::is_valid(provided) {
            return Err(StoreError::InvalidInput(format!(
                "invalid slug: {provided:?}"
            )));
        }
        return Ok(provided.to_string());
    }

    if let Some(existing) = fallback {
        return Ok(existing.to_string());
    }

    let derived = slug::slugify(&input.title);
    if derived.is_empty() {
        return Err(StoreError::InvalidInput(
            "slug is empty after normalization".to_string(),
        ));
    }
    Ok(derived)
}

impl Database {
    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Public listing: published articles whose `publish_at` is absent or in
    /// the past, newest update first, tags included.
    pub async fn list_articles(&self) -> Result<Vec<ArticleSummary>, StoreError> {
        let now = now_iso();
        let rows: Vec<SummaryRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS}
            FROM articles a
            WHERE a.status = 'published' AND (a.publish_at IS NULL OR a.publish_at <= ?)
            ORDER BY a.updated_at DESC
            "#
        ))
        .bind(&now)
        .fetch_all(&self.pool)
        .await?;

        self.attach_tags(rows).await
    }

    /// Admin listing: drafts and future-scheduled articles included, with
    /// optional status/department filters, an optional full-text term, and
    /// a choice of newest-first sort key.
    pub async fn admin_list_articles(
        &self,
        filter: &ArticleFilter,
    ) -> Result<Vec<ArticleSummary>, StoreError> {
        let term = filter.q.as_deref().map(str::trim).unwrap_or("");

        let mut builder: QueryBuilder<Sqlite> = if term.is_empty() {
            QueryBuilder::new(format!(
                "SELECT {SUMMARY_COLUMNS} FROM articles a WHERE 1=1"
            ))
        } else {
            super::search::validate_term(term)?;
            let mut b = QueryBuilder::new(format!(
                "SELECT {SUMMARY_COLUMNS} FROM articles_fts f \
                 JOIN articles a ON a.id = f.rowid WHERE f MATCH "
            ));
            b.push_bind(term.to_string());
            b
        };

        if let StatusFilter::Draft | StatusFilter::Published = filter.status {
            builder.push(" AND a.status = ");
            builder.push_bind(match filter.status {
                StatusFilter::Draft => "draft",
                _ => "published",
            });
        }
        if let Some(department) = filter.department.as_deref().filter(|d| !d.is_empty()) {
            builder.push(" AND a.department = ");
            builder.push_bind(department.to_string());
        }
        builder.push(match filter.sort {
            SortKey::Updated => " ORDER BY a.updated_at DESC",
            SortKey::Created => " ORDER BY a.created_at DESC",
        });

        let rows: Vec<SummaryRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| match &e {
                // Raw admin terms hit the FTS parser directly; report its
                // syntax complaints as bad input, not storage failure.
                sqlx::Error::Database(db) if db.message().contains("fts5") => {
                    StoreError::InvalidInput(format!("invalid search term: {term:?}"))
                }
                _ => StoreError::Database(e),
            })?;

        self.attach_tags(rows).await
    }

    /// Full record for one slug, tags included.
    pub async fn get_article(&self, slug: &str) -> Result<Article, StoreError> {
        let row: Option<ArticleRow> = sqlx::query_as(
            r#"
            SELECT id, slug, title, description, department, content_html,
                   status, publish_at, created_at, updated_at,
                   image_url, image_x, image_y
            FROM articles WHERE slug = ?
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::NotFound("article"));
        };

        let mut conn = self.pool.acquire().await?;
        let tag_names = tags::tags_for_article(&mut conn, row.id).await?;
        Ok(row.into_article(tag_names))
    }

    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Create an article, returning the final slug.
    ///
    /// The row insert and the tag links commit together or not at all.
    pub async fn create_article(&self, input: &ArticleInput) -> Result<String, StoreError> {
        validate_input(input)?;
        let slug = effective_slug(input, None)?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM articles WHERE slug = ?")
            .bind(&slug)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_some() {
            return Err(StoreError::Conflict("slug already exists"));
        }

        let now = now_iso();
        let mut tx = self.pool.begin().await?;

        let (article_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO articles (slug, title, description, department, content_html,
                                  created_at, updated_at, status, publish_at,
                                  image_url, image_x, image_y)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&slug)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.department)
        .bind(&input.content_html)
        .bind(&now)
        .bind(&now)
        .bind(input.status.as_str())
        .bind(&input.publish_at)
        .bind(&input.image_url)
        .bind(input.image_x)
        .bind(input.image_y)
        .fetch_one(&mut *tx)
        .await
        // The pre-check races against concurrent writers; the UNIQUE
        // constraint is the authority.
        .map_err(|e| StoreError::conflict_on_unique(e, "slug already exists"))?;

        tags::link_tags(&mut tx, article_id, &input.tags).await?;
        tx.commit().await?;

        tracing::debug!(slug = %slug, "article created");
        Ok(slug)
    }

    /// Update the article currently known as `old_slug`, returning the new
    /// (possibly unchanged) slug.
    ///
    /// A snapshot of the pre-update state lands in the version history
    /// inside the same transaction, so history and content never diverge.
    pub async fn update_article(
        &self,
        old_slug: &str,
        input: &ArticleInput,
    ) -> Result<String, StoreError> {
        validate_input(input)?;

        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM articles WHERE slug = ?")
            .bind(old_slug)
            .fetch_optional(&self.pool)
            .await?;
        let Some((article_id,)) = existing else {
            return Err(StoreError::NotFound("article"));
        };

        let slug = effective_slug(input, Some(old_slug))?;
        if slug != old_slug {
            let dup: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM articles WHERE slug = ?")
                .bind(&slug)
                .fetch_optional(&self.pool)
                .await?;
            if dup.is_some() {
                return Err(StoreError::Conflict("slug already exists"));
            }
        }

        let now = now_iso();
        let mut tx = self.pool.begin().await?;

        versions::snapshot_article(&mut tx, article_id, &now).await?;

        sqlx::query(
            r#"
            UPDATE articles
            SET slug = ?, title = ?, description = ?, department = ?, content_html = ?,
                updated_at = ?, status = ?, publish_at = ?,
                image_url = ?, image_x = ?, image_y = ?
            WHERE id = ?
            "#,
        )
        .bind(&slug)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.department)
        .bind(&input.content_html)
        .bind(&now)
        .bind(input.status.as_str())
        .bind(&input.publish_at)
        .bind(&input.image_url)
        .bind(input.image_x)
        .bind(input.image_y)
        .bind(article_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::conflict_on_unique(e, "slug already exists"))?;

        tags::replace_article_tags(&mut tx, article_id, &input.tags).await?;
        tx.commit().await?;

        tracing::debug!(old_slug = %old_slug, slug = %slug, "article updated");
        Ok(slug)
    }

    /// Delete an article. Tag links, version history, and any pinned slot
    /// go with it via ON DELETE CASCADE; the search index row via trigger.
    pub async fn delete_article(&self, slug: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM articles WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("article"));
        }
        tracing::debug!(slug = %slug, "article deleted");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Join tag lists onto listing rows with one batch query.
    pub(crate) async fn attach_tags(
        &self,
        rows: Vec<SummaryRow>,
    ) -> Result<Vec<ArticleSummary>, StoreError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut tag_map = tags::tags_by_article(self, &ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let tag_names = tag_map.remove(&row.id).unwrap_or_default();
                row.into_summary(tag_names)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{
        ArticleFilter, ArticleInput, ArticleStatus, Database, SortKey, StatusFilter, StoreError,
    };
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_article(slug: &str, title: &str) -> ArticleInput {
        ArticleInput {
            slug: Some(slug.to_string()),
            title: title.to_string(),
            description: format!("About {}", title),
            content_html: format!("<p>{}</p>", title),
            ..ArticleInput::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let db = test_db().await;
        let input = ArticleInput {
            slug: Some("benefits".to_string()),
            title: "Benefits Overview".to_string(),
            description: "What the company offers".to_string(),
            department: Some("People Operations".to_string()),
            content_html: "<h1>Benefits</h1><p>Details.</p>".to_string(),
            status: ArticleStatus::Published,
            publish_at: None,
            image_url: Some("/uploads/benefits.png".to_string()),
            image_x: Some(25.0),
            image_y: Some(75.0),
            tags: vec!["benefits".to_string(), "hr".to_string()],
        };

        let slug = db.create_article(&input).await.unwrap();
        assert_eq!(slug, "benefits");

        let article = db.get_article("benefits").await.unwrap();
        assert_eq!(article.title, input.title);
        assert_eq!(article.description, input.description);
        assert_eq!(article.department, input.department);
        assert_eq!(article.content_html, input.content_html);
        assert_eq!(article.status, ArticleStatus::Published);
        assert_eq!(article.image_url, input.image_url);
        assert_eq!(article.image_x, 25.0);
        assert_eq!(article.image_y, 75.0);
        let mut tags = article.tags.clone();
        tags.sort();
        assert_eq!(tags, vec!["benefits".to_string(), "hr".to_string()]);
        assert_eq!(article.created_at, article.updated_at);
    }

    #[tokio::test]
    async fn test_create_derives_slug_from_title() {
        let db = test_db().await;
        let mut input = test_article("ignored", "Code of Conduct!  2024");
        input.slug = None;

        let slug = db.create_article(&input).await.unwrap();
        assert_eq!(slug, "code-of-conduct-2024");
    }

    #[tokio::test]
    async fn test_create_rejects_unslugifiable_title() {
        let db = test_db().await;
        let mut input = test_article("ignored", "!!!");
        input.slug = None;

        let err = db.create_article(&input).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_slug() {
        let db = test_db().await;
        let input = test_article("Not A Slug", "Title");
        let err = db.create_article(&input).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_blank_required_fields() {
        let db = test_db().await;

        let mut input = test_article("a", "Title");
        input.title = "  ".to_string();
        assert!(matches!(
            db.create_article(&input).await.unwrap_err(),
            StoreError::InvalidInput(_)
        ));

        let mut input = test_article("a", "Title");
        input.description = String::new();
        assert!(matches!(
            db.create_article(&input).await.unwrap_err(),
            StoreError::InvalidInput(_)
        ));

        let mut input = test_article("a", "Title");
        input.content_html = String::new();
        assert!(matches!(
            db.create_article(&input).await.unwrap_err(),
            StoreError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_non_finite_offsets() {
        let db = test_db().await;
        let mut input = test_article("nan", "Title");
        input.image_x = Some(f64::NAN);
        assert!(matches!(
            db.create_article(&input).await.unwrap_err(),
            StoreError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_create_duplicate_slug_conflicts_and_keeps_original() {
        let db = test_db().await;
        db.create_article(&test_article("policy", "Original"))
            .await
            .unwrap();

        let err = db
            .create_article(&test_article("policy", "Impostor"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let article = db.get_article("policy").await.unwrap();
        assert_eq!(article.title, "Original");
    }

    #[tokio::test]
    async fn test_image_offsets_default_to_center() {
        let db = test_db().await;
        db.create_article(&test_article("plain", "Plain")).await.unwrap();

        let article = db.get_article("plain").await.unwrap();
        assert_eq!(article.image_x, 50.0);
        assert_eq!(article.image_y, 50.0);
        assert_eq!(article.image_url, None);
    }

    #[tokio::test]
    async fn test_get_unknown_slug() {
        let db = test_db().await;
        let err = db.get_article("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("article")));
    }

    #[tokio::test]
    async fn test_update_changes_fields_and_moves_slug() {
        let db = test_db().await;
        db.create_article(&test_article("old-name", "Old Title"))
            .await
            .unwrap();

        let mut input = test_article("new-name", "New Title");
        input.tags = vec!["fresh".to_string()];
        let slug = db.update_article("old-name", &input).await.unwrap();
        assert_eq!(slug, "new-name");

        let article = db.get_article("new-name").await.unwrap();
        assert_eq!(article.title, "New Title");
        assert_eq!(article.tags, vec!["fresh".to_string()]);
        assert!(article.updated_at >= article.created_at);

        let err = db.get_article("old-name").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("article")));
    }

    #[tokio::test]
    async fn test_update_keeps_slug_when_blank() {
        let db = test_db().await;
        db.create_article(&test_article("stable", "Title"))
            .await
            .unwrap();

        let mut input = test_article("stable", "Renamed");
        input.slug = None;
        let slug = db.update_article("stable", &input).await.unwrap();
        assert_eq!(slug, "stable");
    }

    #[tokio::test]
    async fn test_update_unknown_slug() {
        let db = test_db().await;
        let err = db
            .update_article("ghost", &test_article("ghost", "Title"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("article")));
    }

    #[tokio::test]
    async fn test_update_slug_collision_conflicts() {
        let db = test_db().await;
        db.create_article(&test_article("first", "First")).await.unwrap();
        db.create_article(&test_article("second", "Second"))
            .await
            .unwrap();

        let err = db
            .update_article("second", &test_article("first", "Second"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Both rows untouched.
        assert_eq!(db.get_article("first").await.unwrap().title, "First");
        assert_eq!(db.get_article("second").await.unwrap().title, "Second");
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let db = test_db().await;
        let mut input = test_article("doomed", "Doomed");
        input.tags = vec!["tagged".to_string()];
        db.create_article(&input).await.unwrap();
        db.update_article("doomed", &test_article("doomed", "Doomed v2"))
            .await
            .unwrap();
        db.pin_article("doomed").await.unwrap();

        db.delete_article("doomed").await.unwrap();

        assert!(matches!(
            db.get_article("doomed").await.unwrap_err(),
            StoreError::NotFound("article")
        ));
        let stats = db.stats().await.unwrap();
        assert_eq!(stats.articles, 0);
        assert_eq!(stats.versions, 0);
        assert_eq!(stats.pinned_articles, 0);

        let err = db.delete_article("doomed").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("article")));
    }

    #[tokio::test]
    async fn test_public_list_hides_drafts() {
        let db = test_db().await;
        db.create_article(&test_article("visible", "Visible"))
            .await
            .unwrap();
        let mut draft = test_article("hidden", "Hidden");
        draft.status = ArticleStatus::Draft;
        db.create_article(&draft).await.unwrap();

        let listed = db.list_articles().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].slug, "visible");
    }

    #[tokio::test]
    async fn test_public_list_hides_future_publish_at() {
        let db = test_db().await;
        let mut scheduled = test_article("later", "Later");
        scheduled.publish_at = Some("2999-01-01T00:00:00.000Z".to_string());
        db.create_article(&scheduled).await.unwrap();

        let mut live = test_article("now", "Now");
        live.publish_at = Some("2000-01-01T00:00:00.000Z".to_string());
        db.create_article(&live).await.unwrap();

        let listed = db.list_articles().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].slug, "now");

        // Admin sees the scheduled one regardless.
        let admin = db
            .admin_list_articles(&ArticleFilter::default())
            .await
            .unwrap();
        assert_eq!(admin.len(), 2);
    }

    #[tokio::test]
    async fn test_admin_list_status_filters_never_cross() {
        let db = test_db().await;
        db.create_article(&test_article("pub", "Published"))
            .await
            .unwrap();
        let mut draft = test_article("dra", "Draft");
        draft.status = ArticleStatus::Draft;
        db.create_article(&draft).await.unwrap();

        let drafts = db
            .admin_list_articles(&ArticleFilter {
                status: StatusFilter::Draft,
                ..ArticleFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].status, ArticleStatus::Draft);

        let published = db
            .admin_list_articles(&ArticleFilter {
                status: StatusFilter::Published,
                ..ArticleFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].status, ArticleStatus::Published);
    }

    #[tokio::test]
    async fn test_admin_list_department_filter() {
        let db = test_db().await;
        let mut eng = test_article("eng", "Engineering Onboarding");
        eng.department = Some("Engineering".to_string());
        db.create_article(&eng).await.unwrap();
        let mut fin = test_article("fin", "Expense Policy");
        fin.department = Some("Finance".to_string());
        db.create_article(&fin).await.unwrap();

        let only_eng = db
            .admin_list_articles(&ArticleFilter {
                department: Some("Engineering".to_string()),
                ..ArticleFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(only_eng.len(), 1);
        assert_eq!(only_eng[0].slug, "eng");
    }

    #[tokio::test]
    async fn test_admin_list_full_text_term() {
        let db = test_db().await;
        db.create_article(&test_article("kubernetes", "Kubernetes Basics"))
            .await
            .unwrap();
        let mut draft = test_article("kube-draft", "Kubernetes Advanced");
        draft.status = ArticleStatus::Draft;
        db.create_article(&draft).await.unwrap();
        db.create_article(&test_article("unrelated", "Cooking Tips"))
            .await
            .unwrap();

        // Admin search includes drafts.
        let hits = db
            .admin_list_articles(&ArticleFilter {
                q: Some("kubernetes".to_string()),
                ..ArticleFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_admin_list_sort_by_created() {
        let db = test_db().await;
        db.create_article(&test_article("first", "First")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        db.create_article(&test_article("second", "Second"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        // Touch the older article so updated/created orders diverge.
        db.update_article("first", &test_article("first", "First touched"))
            .await
            .unwrap();

        let by_updated = db
            .admin_list_articles(&ArticleFilter::default())
            .await
            .unwrap();
        assert_eq!(by_updated[0].slug, "first");

        let by_created = db
            .admin_list_articles(&ArticleFilter {
                sort: SortKey::Created,
                ..ArticleFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_created[0].slug, "second");
    }
}
