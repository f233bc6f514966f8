//! Storage backend for an internal e-learning site.
//!
//! Everything lives in a single SQLite file: articles with HTML bodies,
//! tags, publish scheduling and card imagery; a department taxonomy; quick
//! links; per-article version history with revert; and a bounded set of
//! articles pinned to the homepage. HTTP handlers and page renderers are
//! thin consumers of [`storage::Database`] — they never touch schema or
//! transactions directly.
//!
//! ```no_run
//! use handbook::storage::{ArticleInput, Database};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let db = Database::open("var/data.db").await?;
//! let slug = db
//!     .create_article(&ArticleInput {
//!         title: "Hello World".to_string(),
//!         description: "First article".to_string(),
//!         content_html: "<p>Hi.</p>".to_string(),
//!         ..ArticleInput::default()
//!     })
//!     .await?;
//! let article = db.get_article(&slug).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod slug;
pub mod storage;
