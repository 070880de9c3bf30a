//! SQLite persistence for the catalog (sources, tags, feeds) and the
//! discovered contents.
//!
//! `contents.url` carries a UNIQUE constraint: it is the global dedup key.
//! Insertion goes through [`Database::insert_content_if_absent`], a single
//! `INSERT … ON CONFLICT(url) DO NOTHING`, so concurrent jobs racing on the
//! same URL end up with exactly one row.

mod catalog;
mod contents;

pub use contents::InsertOutcome;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations.
    #[instrument(level = "info", skip_all, fields(%path))]
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        // Concurrent scrape jobs wait up to 5s for the writer lock.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        info!("Database ready");
        Ok(db)
    }

    /// Create the schema. Every statement is idempotent.
    async fn migrate(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                slug TEXT UNIQUE NOT NULL,
                source_type TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                slug TEXT UNIQUE NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // A source belongs to at most one feed.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                source_id INTEGER UNIQUE REFERENCES sources(id) ON DELETE CASCADE,
                active INTEGER NOT NULL DEFAULT 1,
                last_job_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_tags (
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (feed_id, tag_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contents (
                id INTEGER PRIMARY KEY,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
                tag_id INTEGER REFERENCES tags(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                viewed INTEGER NOT NULL DEFAULT 0,
                bookmarked INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_contents_feed ON contents(feed_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_contents_tag ON contents(tag_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_contents_created ON contents(created_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// A fresh on-disk database; keep the `TempDir` alive for the test.
    pub async fn test_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        (dir, db)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_db;
    use super::*;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (dir, db) = test_db().await;
        db.migrate().await.unwrap();
        drop(db);

        let path = dir.path().join("watch.db");
        let reopened = Database::open(path.to_str().unwrap()).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contents")
            .fetch_one(&reopened.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_open_path_with_url_characters() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("what?now#1");
        std::fs::create_dir(&nested).unwrap();
        let path = nested.join("watch.db");

        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(db.count_contents().await.unwrap(), 0);
        assert!(path.exists());
    }
}
