use super::{Database, StoreError, now};
use crate::models::{Candidate, Content};
use tracing::debug;

type ContentRow = (i64, i64, i64, Option<i64>, String, String, bool, bool, i64);

const CONTENT_SELECT: &str = r#"
    SELECT id, feed_id, source_id, tag_id, title, url, viewed, bookmarked, created_at
    FROM contents
"#;

/// Result of offering a candidate to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written with this id.
    Created(i64),
    /// A row with the same URL was already present and was left untouched.
    Existing,
}

impl Database {
    /// Store `candidate` unless a content with the same URL exists.
    ///
    /// New rows start with `viewed = false` and `bookmarked = false`.
    pub async fn insert_content_if_absent(
        &self,
        candidate: &Candidate,
    ) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO contents (feed_id, source_id, tag_id, title, url, viewed, bookmarked, created_at)
            VALUES (?, ?, ?, ?, ?, 0, 0, ?)
            ON CONFLICT(url) DO NOTHING
        "#,
        )
        .bind(candidate.feed_id)
        .bind(candidate.source_id)
        .bind(candidate.tag_id)
        .bind(&candidate.title)
        .bind(&candidate.url)
        .bind(now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(url = %candidate.url, "Content already exists");
            Ok(InsertOutcome::Existing)
        } else {
            Ok(InsertOutcome::Created(result.last_insert_rowid()))
        }
    }

    pub async fn find_content_by_url(&self, url: &str) -> Result<Option<Content>, StoreError> {
        let row: Option<ContentRow> = sqlx::query_as(&format!("{CONTENT_SELECT} WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(content_from_row))
    }

    /// Most recent contents first.
    pub async fn list_contents(&self, limit: i64) -> Result<Vec<Content>, StoreError> {
        let rows: Vec<ContentRow> = sqlx::query_as(&format!(
            "{CONTENT_SELECT} ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(content_from_row).collect())
    }

    pub async fn mark_viewed(&self, content_id: i64, viewed: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE contents SET viewed = ? WHERE id = ?")
            .bind(viewed)
            .bind(content_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("content {content_id}")));
        }
        Ok(())
    }

    /// Flip the bookmark flag and return its new value.
    pub async fn toggle_bookmarked(&self, content_id: i64) -> Result<bool, StoreError> {
        let row: Option<(bool,)> = sqlx::query_as(
            "UPDATE contents SET bookmarked = NOT bookmarked WHERE id = ? RETURNING bookmarked",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(bookmarked,)| bookmarked)
            .ok_or_else(|| StoreError::NotFound(format!("content {content_id}")))
    }

    /// Number of contents discovered by a feed.
    pub async fn feed_count(&self, feed_id: i64) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contents WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of contents classified under a tag.
    pub async fn tag_count(&self, tag_id: i64) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contents WHERE tag_id = ?")
            .bind(tag_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_contents(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn content_from_row(row: ContentRow) -> Content {
    let (id, feed_id, source_id, tag_id, title, url, viewed, bookmarked, created_at) = row;
    Content {
        id,
        feed_id,
        source_id,
        tag_id,
        title,
        url,
        viewed,
        bookmarked,
        created_at,
    }
}
