//! Feed registry and source subscriptions.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{Feed, NewFeed};

const COLS: &str = "id, pipeline_id, user_id, feed_type, prompt_text, active, created_at, updated_at";

/// Stateless accessor for the `feeds` and `feed_sources` tables.
pub struct FeedStore;

impl FeedStore {
    /// Fetch a feed by id.
    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Feed, StoreError> {
        let sql = format!("SELECT {COLS} FROM feeds WHERE id = $1");
        sqlx::query_as::<_, Feed>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Insert a feed with its announced id. Returns `None` when the id
    /// already exists, which is how a redelivered announcement turns
    /// into a no-op.
    pub async fn insert_if_absent(pool: &PgPool, feed: &NewFeed) -> Result<Option<Feed>, StoreError> {
        let sql = format!(
            "INSERT INTO feeds (id, pipeline_id, user_id, feed_type, prompt_text) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {COLS}"
        );
        Ok(sqlx::query_as::<_, Feed>(&sql)
            .bind(feed.id)
            .bind(feed.pipeline_id)
            .bind(feed.user_id)
            .bind(&feed.feed_type)
            .bind(&feed.prompt_text)
            .fetch_optional(pool)
            .await?)
    }

    /// Subscribe a feed to a source. Idempotent.
    pub async fn link_source(pool: &PgPool, feed_id: Uuid, source_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO feed_sources (feed_id, source_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(feed_id)
        .bind(source_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Active feeds subscribed to a source, in creation order.
    pub async fn active_for_source(pool: &PgPool, source_id: Uuid) -> Result<Vec<Feed>, StoreError> {
        let sql = format!(
            "SELECT f.{} FROM feeds f \
             JOIN feed_sources fs ON fs.feed_id = f.id \
             WHERE fs.source_id = $1 AND f.active \
             ORDER BY f.created_at, f.id",
            COLS.replace(", ", ", f.")
        );
        Ok(sqlx::query_as::<_, Feed>(&sql)
            .bind(source_id)
            .fetch_all(pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_column_list_prefixes_every_column() {
        let joined = format!("f.{}", COLS.replace(", ", ", f."));
        for col in COLS.split(", ") {
            assert!(joined.contains(&format!("f.{col}")), "missing f.{col}");
        }
    }
}
