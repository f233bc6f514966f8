use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-open errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of handbook appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Could not create the database directory
    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

/// Typed failures raised by store operations.
///
/// Callers map these to their transport's responses: `NotFound` → 404,
/// `Conflict` → 409, `InvalidInput` → 400, everything else → 500.
/// Mutating calls never swallow write errors; read paths tolerate
/// row-level oddities instead of failing a whole listing.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown slug or id
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Duplicate slug, name, or occupied slot
    #[error("{0}")]
    Conflict(&'static str),

    /// Empty required field, malformed slug, non-finite number
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Storage engine failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Version snapshot tag list could not be encoded or decoded
    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl StoreError {
    /// Map a unique-constraint violation to a `Conflict`, passing other
    /// errors through as `Database`.
    pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &'static str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(message),
            _ => StoreError::Database(err),
        }
    }
}

// ============================================================================
// Time
// ============================================================================

/// Current UTC time as an ISO-8601 string with millisecond precision and a
/// `Z` suffix (`2024-01-01T12:00:00.000Z`). Timestamps are stored as TEXT;
/// this format keeps lexicographic comparison equal to chronological order,
/// which the visibility filter (`publish_at <= now`) relies on.
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Articles
// ============================================================================

/// Focal-point percentage used when a card image offset is absent.
pub(crate) const DEFAULT_IMAGE_FOCUS: f64 = 50.0;

/// Article publication status.
///
/// Stored as TEXT. Unknown values in pre-existing rows read as `Published`,
/// so a listing never fails on one odd row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Draft,
    Published,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::Published => "published",
        }
    }

    pub(crate) fn from_db(value: &str) -> Self {
        match value {
            "draft" => ArticleStatus::Draft,
            _ => ArticleStatus::Published,
        }
    }
}

impl Default for ArticleStatus {
    fn default() -> Self {
        ArticleStatus::Published
    }
}

impl std::fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload for creating or updating an article.
///
/// `slug: None` (or blank) means "derive from the title" on create and
/// "keep the old slug" on update. `content_html` is pre-sanitized input;
/// the store persists it verbatim.
#[derive(Debug, Clone, Default)]
pub struct ArticleInput {
    pub slug: Option<String>,
    pub title: String,
    pub description: String,
    pub department: Option<String>,
    pub content_html: String,
    pub status: ArticleStatus,
    /// ISO-8601 timestamp gating public visibility even when published.
    pub publish_at: Option<String>,
    pub image_url: Option<String>,
    pub image_x: Option<f64>,
    pub image_y: Option<f64>,
    pub tags: Vec<String>,
}

/// Article listing entry: everything but the body and schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleSummary {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub department: Option<String>,
    pub tags: Vec<String>,
    pub status: ArticleStatus,
    pub created_at: String,
    pub updated_at: String,
    pub image_url: Option<String>,
    pub image_x: f64,
    pub image_y: f64,
}

/// Full article record as returned by `get_article`.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub department: Option<String>,
    pub content_html: String,
    pub tags: Vec<String>,
    pub status: ArticleStatus,
    pub publish_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub image_url: Option<String>,
    pub image_x: f64,
    pub image_y: f64,
}

/// Status filter for admin listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Draft,
    Published,
}

/// Sort key for admin listings. Both orders are newest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Updated,
    Created,
}

/// Admin listing filter. Defaults list everything, updated-first.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    /// Full-text search term routed through the search index.
    pub q: Option<String>,
    pub status: StatusFilter,
    pub department: Option<String>,
    pub sort: SortKey,
}

// ============================================================================
// Versions
// ============================================================================

/// One entry of an article's version history, newest first.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct VersionEntry {
    pub id: i64,
    pub created_at: String,
    pub title: String,
}

// ============================================================================
// Departments / Quick links / Pinned articles
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct QuickLink {
    pub id: i64,
    pub title: String,
    pub href: String,
    pub description: Option<String>,
    pub position: i64,
}

/// Input for `create_quick_link`; position is assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewQuickLink {
    pub title: String,
    pub href: String,
    pub description: Option<String>,
}

/// A homepage-pinned article joined with its live card attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedArticle {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub department: Option<String>,
    pub image_url: Option<String>,
    pub image_x: f64,
    pub image_y: f64,
    pub position: i64,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for listing queries (used by sqlx FromRow).
/// Carries the article id so tag lists can be joined in afterwards.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SummaryRow {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub department: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub image_url: Option<String>,
    pub image_x: Option<f64>,
    pub image_y: Option<f64>,
}

impl SummaryRow {
    pub(crate) fn into_summary(self, tags: Vec<String>) -> ArticleSummary {
        ArticleSummary {
            slug: self.slug,
            title: self.title,
            description: self.description,
            department: self.department.filter(|d| !d.is_empty()),
            tags,
            status: ArticleStatus::from_db(&self.status),
            created_at: self.created_at,
            updated_at: self.updated_at,
            image_url: self.image_url,
            image_x: self.image_x.unwrap_or(DEFAULT_IMAGE_FOCUS),
            image_y: self.image_y.unwrap_or(DEFAULT_IMAGE_FOCUS),
        }
    }
}

/// Internal row type for `get_article`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleRow {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub department: Option<String>,
    pub content_html: String,
    pub status: String,
    pub publish_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub image_url: Option<String>,
    pub image_x: Option<f64>,
    pub image_y: Option<f64>,
}

impl ArticleRow {
    pub(crate) fn into_article(self, tags: Vec<String>) -> Article {
        Article {
            slug: self.slug,
            title: self.title,
            description: self.description,
            department: self.department.filter(|d| !d.is_empty()),
            content_html: self.content_html,
            tags,
            status: ArticleStatus::from_db(&self.status),
            publish_at: self.publish_at.filter(|p| !p.is_empty()),
            created_at: self.created_at,
            updated_at: self.updated_at,
            image_url: self.image_url,
            image_x: self.image_x.unwrap_or(DEFAULT_IMAGE_FOCUS),
            image_y: self.image_y.unwrap_or(DEFAULT_IMAGE_FOCUS),
        }
    }
}

/// Internal row type for a full version snapshot (revert path).
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct VersionRow {
    pub article_id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub department: Option<String>,
    pub content_html: String,
    pub status: String,
    pub publish_at: Option<String>,
    pub tags_json: Option<String>,
}

/// Internal row type for the pinned-article join.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PinnedRow {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub department: Option<String>,
    pub image_url: Option<String>,
    pub image_x: Option<f64>,
    pub image_y: Option<f64>,
    pub position: i64,
}

impl PinnedRow {
    pub(crate) fn into_pinned(self) -> PinnedArticle {
        PinnedArticle {
            slug: self.slug,
            title: self.title,
            description: self.description,
            department: self.department.filter(|d| !d.is_empty()),
            image_url: self.image_url,
            image_x: self.image_x.unwrap_or(DEFAULT_IMAGE_FOCUS),
            image_y: self.image_y.unwrap_or(DEFAULT_IMAGE_FOCUS),
            position: self.position,
        }
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Row counts reported by the maintenance CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    pub articles: i64,
    pub versions: i64,
    pub tags: i64,
    pub departments: i64,
    pub quick_links: i64,
    pub pinned_articles: i64,
}
