use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use handbook::config::Config;
use handbook::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(
    name = "handbook",
    about = "Storage maintenance for the handbook e-learning backend"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "handbook.toml")]
    config: PathBuf,

    /// Database file (overrides the config file and HANDBOOK_DB)
    #[arg(long, value_name = "FILE")]
    db: Option<String>,

    /// Rebuild the search index (FTS5)
    #[arg(long)]
    rebuild_search: bool,

    /// Check search index consistency
    #[arg(long)]
    check_search: bool,

    /// Print row counts
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let db_path = args.db.unwrap_or_else(|| config.database_path());

    // Opening runs migrations and seeds the department taxonomy; a schema
    // failure here means the process cannot serve, so it is fatal.
    let db = match Database::open(&db_path).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of handbook appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database {}: {}", db_path, e));
        }
    };

    if args.rebuild_search {
        tracing::info!("rebuilding search index...");
        let count = db
            .rebuild_search_index()
            .await
            .context("Failed to rebuild search index")?;
        tracing::info!(articles = count, "search index rebuilt");
        println!("Search index rebuilt: {} articles indexed", count);
    }

    if args.check_search {
        let report = db
            .check_search_consistency()
            .await
            .context("Failed to check search index consistency")?;
        if report.is_consistent {
            println!("Search index is consistent ({} articles).", report.articles_count);
        } else {
            eprintln!(
                "Warning: Search index is out of sync (missing: {}, orphaned: {}). Run with --rebuild-search to fix.",
                report.missing_entries, report.orphaned_entries
            );
            std::process::exit(2);
        }
    }

    if args.stats {
        let stats = db.stats().await.context("Failed to read stats")?;
        println!("articles:        {}", stats.articles);
        println!("versions:        {}", stats.versions);
        println!("tags:            {}", stats.tags);
        println!("departments:     {}", stats.departments);
        println!("quick links:     {}", stats.quick_links);
        println!("pinned articles: {}", stats.pinned_articles);
    }

    if !args.rebuild_search && !args.check_search && !args.stats {
        let stats = db.stats().await.context("Failed to read stats")?;
        println!(
            "Database ready at {} ({} articles, {} departments).",
            db_path, stats.articles, stats.departments
        );
    }

    Ok(())
}
