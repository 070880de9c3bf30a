use super::{Database, StoreError, now};
use crate::config::Config;
use crate::models::{Feed, Source, SourceType, Tag};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Row type for the feed listing query (feed columns + optional source)
type FeedRow = (
    i64,
    bool,
    Option<String>,
    i64,
    i64,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

const FEED_SELECT: &str = r#"
    SELECT f.id, f.active, f.last_job_id, f.created_at, f.updated_at,
           s.id, s.name, s.slug, s.source_type, s.url
    FROM feeds f
    LEFT JOIN sources s ON s.id = f.source_id
"#;

/// What `seed` wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub tags: usize,
    pub sources: usize,
    pub feeds: usize,
}

impl Database {
    // ========================================================================
    // Tags & Sources
    // ========================================================================

    /// Insert a tag or rename the one with the same slug. Returns its id.
    pub async fn upsert_tag(&self, name: &str, slug: &str) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO tags (name, slug) VALUES (?, ?)
            ON CONFLICT(slug) DO UPDATE SET name = excluded.name
            RETURNING id
        "#,
        )
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Insert a source or update the one with the same slug. Returns its id.
    pub async fn upsert_source(
        &self,
        name: &str,
        slug: &str,
        source_type: SourceType,
        url: &str,
    ) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sources (name, slug, source_type, url) VALUES (?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                name = excluded.name,
                source_type = excluded.source_type,
                url = excluded.url
            RETURNING id
        "#,
        )
        .bind(name)
        .bind(slug)
        .bind(source_type.as_str())
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn find_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>, StoreError> {
        let row: Option<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, slug FROM tags WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, name, slug)| Tag { id, name, slug }))
    }

    /// Every tag, by name.
    pub async fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, slug FROM tags ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, slug)| Tag { id, name, slug })
            .collect())
    }

    /// Natural-key lookup of a source.
    pub async fn find_source_by_slug(&self, slug: &str) -> Result<Option<Source>, StoreError> {
        let row: Option<(i64, String, String, String, String)> = sqlx::query_as(
            "SELECT id, name, slug, source_type, url FROM sources WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(id, name, slug, source_type, url)| source_from_parts(id, name, slug, source_type, url))
            .transpose()
    }

    // ========================================================================
    // Feeds
    // ========================================================================

    /// Create a feed, optionally bound to a source, with the given tags.
    pub async fn create_feed(
        &self,
        source_id: Option<i64>,
        tag_ids: &[i64],
        active: bool,
    ) -> Result<i64, StoreError> {
        let ts = now();
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO feeds (source_id, active, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(source_id)
        .bind(active)
        .bind(ts)
        .bind(ts)
        .execute(&mut *tx)
        .await?;
        let feed_id = result.last_insert_rowid();

        for tag_id in tag_ids {
            sqlx::query("INSERT OR IGNORE INTO feed_tags (feed_id, tag_id) VALUES (?, ?)")
                .bind(feed_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(feed_id)
    }

    /// Create the feed of `source_id`, or replace its tags and active flag.
    pub async fn upsert_feed_for_source(
        &self,
        source_id: i64,
        tag_ids: &[i64],
        active: bool,
    ) -> Result<i64, StoreError> {
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM feeds WHERE source_id = ?")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some((feed_id,)) = existing else {
            return self.create_feed(Some(source_id), tag_ids, active).await;
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE feeds SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(now())
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM feed_tags WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;
        for tag_id in tag_ids {
            sqlx::query("INSERT OR IGNORE INTO feed_tags (feed_id, tag_id) VALUES (?, ?)")
                .bind(feed_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(feed_id)
    }

    /// Every feed with its source and tags, most recently updated first.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let rows: Vec<FeedRow> =
            sqlx::query_as(&format!("{FEED_SELECT} ORDER BY f.updated_at DESC, f.id DESC"))
                .fetch_all(&self.pool)
                .await?;
        let mut tags = self.tags_by_feed().await?;
        rows.into_iter()
            .map(|row| {
                let feed_tags = tags.remove(&row.0).unwrap_or_default();
                feed_from_row(row, feed_tags)
            })
            .collect()
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, StoreError> {
        let row: Option<FeedRow> = sqlx::query_as(&format!("{FEED_SELECT} WHERE f.id = ?"))
            .bind(feed_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let tags: Vec<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT t.id, t.name, t.slug
            FROM tags t
            JOIN feed_tags ft ON ft.tag_id = t.id
            WHERE ft.feed_id = ?
            ORDER BY t.name
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        let tags = tags
            .into_iter()
            .map(|(id, name, slug)| Tag { id, name, slug })
            .collect();
        feed_from_row(row, tags).map(Some)
    }

    /// Record the handle of the job last dispatched for a feed.
    pub async fn set_feed_last_job(&self, feed_id: i64, job_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE feeds SET last_job_id = ?, updated_at = ? WHERE id = ?")
            .bind(job_id)
            .bind(now())
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("feed {feed_id}")));
        }
        Ok(())
    }

    async fn tags_by_feed(&self) -> Result<HashMap<i64, Vec<Tag>>, StoreError> {
        let rows: Vec<(i64, i64, String, String)> = sqlx::query_as(
            r#"
            SELECT ft.feed_id, t.id, t.name, t.slug
            FROM feed_tags ft
            JOIN tags t ON t.id = ft.tag_id
            ORDER BY t.name
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
        for (feed_id, id, name, slug) in rows {
            map.entry(feed_id).or_default().push(Tag { id, name, slug });
        }
        Ok(map)
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    /// Apply the catalog declared in the config file.
    ///
    /// Tags and sources are upserted by slug. Each feed entry creates or
    /// updates the feed bound to its source. A feed naming an unknown source
    /// or tag slug is an error.
    #[instrument(level = "info", skip_all)]
    pub async fn seed(&self, config: &Config) -> Result<SeedReport, StoreError> {
        let mut report = SeedReport::default();

        let mut tag_ids = HashMap::new();
        for tag in &config.tags {
            let slug = tag.slug();
            let id = self.upsert_tag(&tag.name, &slug).await?;
            tag_ids.insert(slug, id);
            report.tags += 1;
        }

        let mut source_ids = HashMap::new();
        for source in &config.sources {
            let slug = source.slug();
            let id = self
                .upsert_source(&source.name, &slug, source.source_type, &source.url)
                .await?;
            source_ids.insert(slug, id);
            report.sources += 1;
        }

        for feed in &config.feeds {
            let source_id = match source_ids.get(&feed.source) {
                Some(id) => *id,
                None => self
                    .find_source_by_slug(&feed.source)
                    .await?
                    .map(|s| s.id)
                    .ok_or_else(|| StoreError::NotFound(format!("source {}", feed.source)))?,
            };
            let mut ids = Vec::with_capacity(feed.tags.len());
            for slug in &feed.tags {
                let id = match tag_ids.get(slug) {
                    Some(id) => *id,
                    None => self
                        .find_tag_by_slug(slug)
                        .await?
                        .map(|t| t.id)
                        .ok_or_else(|| StoreError::NotFound(format!("tag {slug}")))?,
                };
                ids.push(id);
            }
            self.upsert_feed_for_source(source_id, &ids, feed.active)
                .await?;
            report.feeds += 1;
        }

        info!(
            tags = report.tags,
            sources = report.sources,
            feeds = report.feeds,
            "Catalog seeded"
        );
        Ok(report)
    }
}

fn source_from_parts(
    id: i64,
    name: String,
    slug: String,
    source_type: String,
    url: String,
) -> Result<Source, StoreError> {
    let source_type = source_type
        .parse::<SourceType>()
        .map_err(StoreError::InvalidData)?;
    Ok(Source {
        id,
        name,
        slug,
        source_type,
        url,
    })
}

fn feed_from_row(row: FeedRow, tags: Vec<Tag>) -> Result<Feed, StoreError> {
    let (id, active, last_job_id, created_at, updated_at, s_id, s_name, s_slug, s_type, s_url) =
        row;
    let source = match (s_id, s_name, s_slug, s_type, s_url) {
        (Some(sid), Some(name), Some(slug), Some(source_type), Some(url)) => {
            Some(source_from_parts(sid, name, slug, source_type, url)?)
        }
        _ => None,
    };
    Ok(Feed {
        id,
        source,
        tags,
        active,
        last_job_id,
        created_at,
        updated_at,
    })
}
