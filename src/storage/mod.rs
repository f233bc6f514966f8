mod articles;
pub(crate) mod departments;
mod quick_articles;
mod quick_links;
mod schema;
mod search;
mod tags;
mod types;
mod versions;

pub use quick_articles::MAX_PINNED_ARTICLES;
pub use schema::Database;
pub use search::SearchConsistencyReport;
pub use types::{
    Article, ArticleFilter, ArticleInput, ArticleStatus, ArticleSummary, DatabaseError,
    DatabaseStats, Department, NewQuickLink, PinnedArticle, QuickLink, SortKey, StatusFilter,
    StoreError, VersionEntry,
};
