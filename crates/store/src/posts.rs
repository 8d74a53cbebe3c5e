//! Processed post storage.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{NewPost, Post};

const COLS: &str = "id, feed_id, raw_post_id, title, content, source_url, created_at";

/// Stateless accessor for the `posts` table.
pub struct PostStore;

impl PostStore {
    /// Insert processed posts for a feed, skipping rows that collide
    /// with an existing (feed, source_url) or (feed, raw_post) pair.
    /// Returns only the rows actually created, in input order.
    pub async fn insert_batch(
        pool: &PgPool,
        feed_id: Uuid,
        drafts: &[NewPost],
    ) -> Result<Vec<Post>, StoreError> {
        let sql = format!(
            "INSERT INTO posts (feed_id, raw_post_id, title, content, source_url) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT DO NOTHING \
             RETURNING {COLS}"
        );

        let mut created = Vec::new();
        for draft in drafts {
            let row = sqlx::query_as::<_, Post>(&sql)
                .bind(feed_id)
                .bind(draft.raw_post_id)
                .bind(&draft.title)
                .bind(&draft.content)
                .bind(&draft.source_url)
                .fetch_optional(pool)
                .await?;
            if let Some(row) = row {
                created.push(row);
            }
        }
        Ok(created)
    }

    /// Newest posts of a feed.
    pub async fn list_for_feed(
        pool: &PgPool,
        feed_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Post>, StoreError> {
        let sql = format!(
            "SELECT {COLS} FROM posts \
             WHERE feed_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(feed_id)
            .bind(limit)
            .fetch_all(pool)
            .await?)
    }
}
