use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::departments::DEFAULT_DEPARTMENTS;
use super::types::{DatabaseError, DatabaseStats, StoreError};

// ============================================================================
// Migrations
// ============================================================================

/// Ordered schema migrations, tracked with `PRAGMA user_version`.
///
/// Each entry is one multi-statement script; a database at version N has had
/// migrations `[0..N]` applied. Never edit a shipped entry — append instead.
const MIGRATIONS: &[&str] = &[
    // 1: base schema — articles, tags, quick links, pinned slots, version
    // history, departments, and the search index with its sync triggers.
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slug TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        department TEXT,
        content_html TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS article_tags (
        article_id INTEGER NOT NULL,
        tag_id INTEGER NOT NULL,
        PRIMARY KEY (article_id, tag_id),
        FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE,
        FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_articles_updated_at ON articles(updated_at);
    CREATE TABLE IF NOT EXISTS quick_links (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        href TEXT NOT NULL,
        description TEXT,
        position INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS quick_articles (
        article_id INTEGER PRIMARY KEY,
        position INTEGER NOT NULL UNIQUE,
        FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE
    );
    CREATE TABLE IF NOT EXISTS article_versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_id INTEGER NOT NULL,
        slug TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        department TEXT,
        content_html TEXT NOT NULL,
        status TEXT NOT NULL,
        publish_at TEXT,
        tags_json TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_article_versions_article
        ON article_versions(article_id, id DESC);
    CREATE TABLE IF NOT EXISTS departments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );
    CREATE VIRTUAL TABLE IF NOT EXISTS articles_fts USING fts5(
        title, description, content, slug UNINDEXED, tokenize = 'porter'
    );
    CREATE TRIGGER IF NOT EXISTS articles_ai AFTER INSERT ON articles BEGIN
        INSERT INTO articles_fts(rowid, title, description, content, slug)
        VALUES (new.id, new.title, new.description, new.content_html, new.slug);
    END;
    CREATE TRIGGER IF NOT EXISTS articles_ad AFTER DELETE ON articles BEGIN
        DELETE FROM articles_fts WHERE rowid = old.id;
    END;
    CREATE TRIGGER IF NOT EXISTS articles_au AFTER UPDATE ON articles BEGIN
        UPDATE articles_fts
        SET title = new.title, description = new.description,
            content = new.content_html, slug = new.slug
        WHERE rowid = new.id;
    END;
    "#,
    // 2: publish scheduling — draft/published status and the optional
    // go-live timestamp. Pre-existing rows read as published.
    r#"
    ALTER TABLE articles ADD COLUMN status TEXT NOT NULL DEFAULT 'published';
    ALTER TABLE articles ADD COLUMN publish_at TEXT;
    "#,
    // 3: card imagery — background image path and focal-point offsets.
    r#"
    ALTER TABLE articles ADD COLUMN image_url TEXT;
    ALTER TABLE articles ADD COLUMN image_x REAL;
    ALTER TABLE articles ADD COLUMN image_y REAL;
    "#,
];

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection pool and bring the schema up to date.
    ///
    /// Creates the parent directory and the file when missing; safe to call
    /// on every process startup against a pre-existing file. The handle is
    /// meant to be constructed once at the composition root and passed
    /// (cloned) to whoever needs it — there is no hidden global.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN),
    /// `DatabaseError::Migration` if a schema step fails, and
    /// `DatabaseError::Other` for other database errors. All are fatal to
    /// startup; the process cannot serve without a migrated schema.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path.contains(":memory:");

        if !in_memory {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path);

        // WAL keeps readers from blocking behind the single writer;
        // busy_timeout=5000 rides out transient lock contention instead of
        // surfacing SQLITE_BUSY to callers. The options apply to every
        // pooled connection.
        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // SQLite is single-writer; 5 connections covers the handful of
        // concurrent request handlers this backend serves. A `:memory:`
        // database exists per connection, so those pools must not grow
        // past one.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Apply pending migrations atomically, then seed the taxonomy.
    ///
    /// `PRAGMA user_version` records how many entries of [`MIGRATIONS`] have
    /// run, so startup does one integer read instead of re-introspecting
    /// columns. All pending scripts run inside a single transaction; SQLite
    /// supports DDL in transactions, so a failure mid-way rolls the file
    /// back to its previous consistent version.
    async fn migrate(&self) -> Result<()> {
        let (version,): (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        let applied = version.max(0) as usize;

        if applied < MIGRATIONS.len() {
            tracing::info!(
                from = applied,
                to = MIGRATIONS.len(),
                "applying schema migrations"
            );

            let mut tx = self.pool.begin().await?;
            for script in &MIGRATIONS[applied..] {
                sqlx::raw_sql(script).execute(&mut *tx).await?;
            }
            // PRAGMA takes no bind parameters; the value is a trusted constant.
            sqlx::query(&format!("PRAGMA user_version = {}", MIGRATIONS.len()))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        self.seed_departments().await?;
        Ok(())
    }

    /// Seed the department table from the built-in list when it is empty.
    ///
    /// INSERT OR IGNORE keeps this idempotent across concurrent startups.
    /// The table is only ever seeded while empty, so an admin's later edits
    /// (including deletions) are never overridden mid-flight.
    async fn seed_departments(&self) -> Result<()> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM departments")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(());
        }

        tracing::info!(count = DEFAULT_DEPARTMENTS.len(), "seeding departments");
        let mut tx = self.pool.begin().await?;
        for name in DEFAULT_DEPARTMENTS {
            sqlx::query("INSERT OR IGNORE INTO departments(name) VALUES (?)")
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Row counts for the maintenance CLI's `--stats` flag.
    pub async fn stats(&self) -> Result<DatabaseStats, StoreError> {
        let count = |table: &'static str| {
            let pool = self.pool.clone();
            async move {
                let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                    .fetch_one(&pool)
                    .await?;
                Ok::<i64, StoreError>(n)
            }
        };

        Ok(DatabaseStats {
            articles: count("articles").await?,
            versions: count("article_versions").await?,
            tags: count("tags").await?,
            departments: count("departments").await?,
            quick_links: count("quick_links").await?,
            pinned_articles: count("quick_articles").await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = test_db().await;
        let stats = db.stats().await.unwrap();
        assert_eq!(stats.articles, 0);
        assert_eq!(stats.versions, 0);
    }

    #[tokio::test]
    async fn test_migrations_set_user_version() {
        let db = test_db().await;
        let (version,): (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(version as usize, super::MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_departments_seeded_once() {
        let db = test_db().await;
        let stats = db.stats().await.unwrap();
        assert_eq!(
            stats.departments as usize,
            crate::storage::departments::DEFAULT_DEPARTMENTS.len()
        );
    }

    #[tokio::test]
    async fn test_open_is_idempotent_on_existing_file() {
        let dir = std::env::temp_dir().join(format!("handbook-test-{}", std::process::id()));
        let path = dir.join("reopen.db");
        let path_str = path.to_str().unwrap().to_string();

        {
            let db = Database::open(&path_str).await.unwrap();
            db.add_department("Freshly Added").await.unwrap();
        }
        {
            // Second open must not re-run migrations or re-seed.
            let db = Database::open(&path_str).await.unwrap();
            let departments = db.list_departments().await.unwrap();
            assert!(departments.iter().any(|d| d.name == "Freshly Added"));
            let seeded = crate::storage::departments::DEFAULT_DEPARTMENTS.len();
            assert_eq!(departments.len(), seeded + 1);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_open_creates_parent_directory() {
        let dir = std::env::temp_dir().join(format!(
            "handbook-test-{}-nested/deeper",
            std::process::id()
        ));
        let path = dir.join("created.db");
        let path_str = path.to_str().unwrap().to_string();

        let db = Database::open(&path_str).await.unwrap();
        db.stats().await.unwrap();
        assert!(path.exists());

        drop(db);
        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }
}
