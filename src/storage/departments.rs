use super::schema::Database;
use super::types::{Department, StoreError};

/// Departments seeded into an empty table at first startup. Purely a
/// starting point — admins add, rename, and delete freely afterwards.
pub(crate) const DEFAULT_DEPARTMENTS: &[&str] = &[
    "Engineering",
    "Product",
    "Design",
    "People Operations",
    "Finance",
    "Legal",
    "Marketing",
    "Sales",
    "Customer Support",
    "Operations",
];

impl Database {
    // ========================================================================
    // Departments
    // ========================================================================
    //
    // `articles.department` is advisory free text with no foreign key into
    // this table, so renames and deletes here never touch articles.

    /// All departments, alphabetical.
    pub async fn list_departments(&self) -> Result<Vec<Department>, StoreError> {
        let departments: Vec<Department> =
            sqlx::query_as("SELECT id, name FROM departments ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(departments)
    }

    /// Add a department, returning the stored row.
    pub async fn add_department(&self, name: &str) -> Result<Department, StoreError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidInput(
                "department name cannot be empty".to_string(),
            ));
        }

        let department: Department =
            sqlx::query_as("INSERT INTO departments(name) VALUES (?) RETURNING id, name")
                .bind(trimmed)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::conflict_on_unique(e, "department already exists"))?;

        Ok(department)
    }

    /// Rename a department, returning the updated row.
    pub async fn rename_department(&self, id: i64, name: &str) -> Result<Department, StoreError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidInput(
                "department name cannot be empty".to_string(),
            ));
        }

        let department: Option<Department> =
            sqlx::query_as("UPDATE departments SET name = ? WHERE id = ? RETURNING id, name")
                .bind(trimmed)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::conflict_on_unique(e, "department already exists"))?;

        department.ok_or(StoreError::NotFound("department"))
    }

    /// Delete a department. Unknown ids are a no-op success; articles keep
    /// whatever department text they already carry.
    pub async fn delete_department(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM departments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_DEPARTMENTS;
    use crate::storage::{ArticleInput, Database, StoreError};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_seeded_defaults_listed_alphabetically() {
        let db = test_db().await;
        let departments = db.list_departments().await.unwrap();
        assert_eq!(departments.len(), DEFAULT_DEPARTMENTS.len());

        let names: Vec<&str> = departments.iter().map(|d| d.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn test_add_department() {
        let db = test_db().await;
        let added = db.add_department("  Research  ").await.unwrap();
        assert_eq!(added.name, "Research");

        let departments = db.list_departments().await.unwrap();
        assert!(departments.iter().any(|d| d.id == added.id));
    }

    #[tokio::test]
    async fn test_add_department_rejects_empty() {
        let db = test_db().await;
        let err = db.add_department("   ").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_add_duplicate_department_conflicts() {
        let db = test_db().await;
        db.add_department("Security").await.unwrap();
        let err = db.add_department("Security").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rename_department() {
        let db = test_db().await;
        let added = db.add_department("Reserch").await.unwrap();
        let renamed = db.rename_department(added.id, "Research").await.unwrap();
        assert_eq!(renamed.id, added.id);
        assert_eq!(renamed.name, "Research");
    }

    #[tokio::test]
    async fn test_rename_unknown_department() {
        let db = test_db().await;
        let err = db.rename_department(9999, "Anything").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("department")));
    }

    #[tokio::test]
    async fn test_rename_to_taken_name_conflicts() {
        let db = test_db().await;
        let added = db.add_department("Platform").await.unwrap();
        let err = db
            .rename_department(added.id, "Engineering")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_department_leaves_articles_untouched() {
        let db = test_db().await;
        let added = db.add_department("Ephemeral").await.unwrap();

        db.create_article(&ArticleInput {
            slug: Some("kept".to_string()),
            title: "Kept".to_string(),
            description: "Desc".to_string(),
            department: Some("Ephemeral".to_string()),
            content_html: "<p>Body</p>".to_string(),
            ..ArticleInput::default()
        })
        .await
        .unwrap();

        db.delete_department(added.id).await.unwrap();
        // Advisory free text: the article keeps the name.
        let article = db.get_article("kept").await.unwrap();
        assert_eq!(article.department.as_deref(), Some("Ephemeral"));

        // Unknown id is a no-op.
        db.delete_department(added.id).await.unwrap();
    }
}
