//! Pipeline processing offsets.
//!
//! An offset means "everything up to and including this raw post has
//! been processed". Advancing is idempotent and never moves backwards,
//! so replaying a batch cannot unprocess anything.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::PipelineOffset;

const COLS: &str = "pipeline_id, source_id, last_post_id, last_post_created_at, updated_at";

/// Stateless accessor for the `pipeline_offsets` table.
pub struct OffsetStore;

impl OffsetStore {
    /// Fetch the offset of one (pipeline, source) pair, if any exists.
    pub async fn get(
        pool: &PgPool,
        pipeline_id: Uuid,
        source_id: Uuid,
    ) -> Result<Option<PipelineOffset>, StoreError> {
        let sql = format!(
            "SELECT {COLS} FROM pipeline_offsets \
             WHERE pipeline_id = $1 AND source_id = $2"
        );
        Ok(sqlx::query_as::<_, PipelineOffset>(&sql)
            .bind(pipeline_id)
            .bind(source_id)
            .fetch_optional(pool)
            .await?)
    }

    /// All offsets of a pipeline. Sources without an offset simply have
    /// no row; their whole backlog is unprocessed.
    pub async fn get_all(pool: &PgPool, pipeline_id: Uuid) -> Result<Vec<PipelineOffset>, StoreError> {
        let sql = format!(
            "SELECT {COLS} FROM pipeline_offsets \
             WHERE pipeline_id = $1 \
             ORDER BY source_id"
        );
        Ok(sqlx::query_as::<_, PipelineOffset>(&sql)
            .bind(pipeline_id)
            .fetch_all(pool)
            .await?)
    }

    /// Move the offset forward to the given raw post. The guard keeps
    /// the offset monotonic under concurrent writers, and re-running
    /// with the same values is a no-op.
    pub async fn advance(
        pool: &PgPool,
        pipeline_id: Uuid,
        source_id: Uuid,
        last_post_id: Uuid,
        last_post_created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO pipeline_offsets \
                 (pipeline_id, source_id, last_post_id, last_post_created_at, updated_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (pipeline_id, source_id) DO UPDATE SET \
                 last_post_id = EXCLUDED.last_post_id, \
                 last_post_created_at = EXCLUDED.last_post_created_at, \
                 updated_at = now() \
             WHERE (EXCLUDED.last_post_created_at, EXCLUDED.last_post_id) \
                 > (pipeline_offsets.last_post_created_at, pipeline_offsets.last_post_id)",
        )
        .bind(pipeline_id)
        .bind(source_id)
        .bind(last_post_id)
        .bind(last_post_created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record an initial offset without ever touching an existing one.
    /// Used after a fresh feed's initial sync to skip the old backlog.
    pub async fn seed(
        pool: &PgPool,
        pipeline_id: Uuid,
        source_id: Uuid,
        last_post_id: Uuid,
        last_post_created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO pipeline_offsets \
                 (pipeline_id, source_id, last_post_id, last_post_created_at, updated_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (pipeline_id, source_id) DO NOTHING",
        )
        .bind(pipeline_id)
        .bind(source_id)
        .bind(last_post_id)
        .bind(last_post_created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
