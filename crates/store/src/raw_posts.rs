//! Raw post storage with deduplication by `unique_code`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{NewRawPost, RawPost};

const COLS: &str =
    "id, source_id, unique_code, title, content, url, author, published_at, created_at";

/// Stateless accessor for the `raw_posts` table.
pub struct RawPostStore;

impl RawPostStore {
    /// Insert fetched items, skipping any whose `unique_code` already
    /// exists. Returns only the rows actually created, in input order.
    ///
    /// Inserting everything and letting the unique index drop the
    /// duplicates keeps concurrent polls of the same source safe
    /// without a check-then-insert race.
    pub async fn insert_batch(
        pool: &PgPool,
        source_id: Uuid,
        posts: &[NewRawPost],
    ) -> Result<Vec<RawPost>, StoreError> {
        let sql = format!(
            "INSERT INTO raw_posts \
                 (source_id, unique_code, title, content, url, author, published_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (unique_code) DO NOTHING \
             RETURNING {COLS}"
        );

        let mut created = Vec::new();
        for post in posts {
            let row = sqlx::query_as::<_, RawPost>(&sql)
                .bind(source_id)
                .bind(&post.unique_code)
                .bind(&post.title)
                .bind(&post.content)
                .bind(&post.url)
                .bind(&post.author)
                .bind(post.published_at)
                .fetch_optional(pool)
                .await?;
            if let Some(row) = row {
                created.push(row);
            }
        }
        Ok(created)
    }

    /// List raw posts of a source strictly after an offset, oldest
    /// first. With no offset, the whole backlog qualifies.
    ///
    /// The (created_at, id) pair orders rows totally, so equal
    /// timestamps cannot hide rows from the scan.
    pub async fn list_after(
        pool: &PgPool,
        source_id: Uuid,
        after: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
    ) -> Result<Vec<RawPost>, StoreError> {
        let sql = format!(
            "SELECT {COLS} FROM raw_posts \
             WHERE source_id = $1 \
               AND ($2::timestamptz IS NULL \
                    OR created_at > $2 \
                    OR (created_at = $2 AND id > $3)) \
             ORDER BY created_at, id \
             LIMIT $4"
        );
        Ok(sqlx::query_as::<_, RawPost>(&sql)
            .bind(source_id)
            .bind(after.map(|(ts, _)| ts))
            .bind(after.map(|(_, id)| id))
            .bind(limit)
            .fetch_all(pool)
            .await?)
    }

    /// Newest raw posts of a source, oldest of the picked window first.
    /// Used for a fresh feed's initial sync.
    pub async fn latest_for_source(
        pool: &PgPool,
        source_id: Uuid,
        limit: i64,
    ) -> Result<Vec<RawPost>, StoreError> {
        let sql = format!(
            "SELECT * FROM ( \
                 SELECT {COLS} FROM raw_posts \
                 WHERE source_id = $1 \
                 ORDER BY created_at DESC, id DESC \
                 LIMIT $2 \
             ) newest ORDER BY created_at, id"
        );
        Ok(sqlx::query_as::<_, RawPost>(&sql)
            .bind(source_id)
            .bind(limit)
            .fetch_all(pool)
            .await?)
    }

    /// Newest raw post of a source, if any. Used to seed a fresh
    /// feed's offset past the already-synced backlog.
    pub async fn newest_for_source(
        pool: &PgPool,
        source_id: Uuid,
    ) -> Result<Option<RawPost>, StoreError> {
        let sql = format!(
            "SELECT {COLS} FROM raw_posts \
             WHERE source_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        Ok(sqlx::query_as::<_, RawPost>(&sql)
            .bind(source_id)
            .fetch_optional(pool)
            .await?)
    }
}
