//! Source registry and polling-tier bookkeeping.
//!
//! Tier transitions run as single UPDATE statements so concurrent
//! workers cannot interleave a read-modify-write; the pure transition
//! rules live in the scheduler crate and are mirrored here in SQL.

use chrono::{DateTime, Utc};
use depesche_core::{PollingTier, SourceType};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::Source;

const COLS: &str = "id, source_type, url, title, polling_tier, tier_updated_at, \
                    priority_boost_until, last_polled_at, last_message_id, \
                    poll_error_count, created_at, updated_at";

/// Stateless accessor for the `sources` table.
pub struct SourceStore;

impl SourceStore {
    /// Fetch a source by id.
    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Source, StoreError> {
        let sql = format!("SELECT {COLS} FROM sources WHERE id = $1");
        sqlx::query_as::<_, Source>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Insert a source, or return the existing row for the same
    /// (kind, url). New sources start in the WARM tier.
    pub async fn get_or_create(
        pool: &PgPool,
        kind: SourceType,
        url: &str,
        title: Option<&str>,
    ) -> Result<Source, StoreError> {
        let insert = format!(
            "INSERT INTO sources (source_type, url, title) VALUES ($1, $2, $3) \
             ON CONFLICT (source_type, url) DO NOTHING \
             RETURNING {COLS}"
        );
        let created = sqlx::query_as::<_, Source>(&insert)
            .bind(kind.as_str())
            .bind(url)
            .bind(title)
            .fetch_optional(pool)
            .await?;

        if let Some(source) = created {
            return Ok(source);
        }

        let select = format!("SELECT {COLS} FROM sources WHERE source_type = $1 AND url = $2");
        Ok(sqlx::query_as::<_, Source>(&select)
            .bind(kind.as_str())
            .bind(url)
            .fetch_one(pool)
            .await?)
    }

    /// Find sources whose effective tier interval has elapsed since the
    /// last poll attempt. Never-polled sources are always due.
    pub async fn find_due(
        pool: &PgPool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Source>, StoreError> {
        let sql = format!(
            "SELECT {COLS} FROM sources \
             WHERE last_polled_at IS NULL \
                OR last_polled_at + make_interval(secs => CASE \
                     WHEN polling_tier = 'QUARANTINE' THEN {quarantine} \
                     WHEN priority_boost_until IS NOT NULL AND priority_boost_until > $1 THEN {hot} \
                     WHEN polling_tier = 'HOT' THEN {hot} \
                     WHEN polling_tier = 'WARM' THEN {warm} \
                     ELSE {cold} END) <= $1 \
             ORDER BY last_polled_at ASC NULLS FIRST, id \
             LIMIT $2",
            quarantine = PollingTier::Quarantine.interval_secs(),
            hot = PollingTier::Hot.interval_secs(),
            warm = PollingTier::Warm.interval_secs(),
            cold = PollingTier::Cold.interval_secs(),
        );
        Ok(sqlx::query_as::<_, Source>(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await?)
    }

    /// Record a successful poll: reset the failure count, advance the
    /// fetch cursor, and lift a quarantined source back to WARM.
    pub async fn record_poll_success(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
        cursor: Option<&str>,
    ) -> Result<Source, StoreError> {
        let sql = format!(
            "UPDATE sources SET \
                 last_polled_at = $2, \
                 poll_error_count = 0, \
                 last_message_id = COALESCE($3::text, last_message_id), \
                 tier_updated_at = CASE WHEN polling_tier = 'QUARANTINE' THEN $2 ELSE tier_updated_at END, \
                 polling_tier = CASE WHEN polling_tier = 'QUARANTINE' THEN 'WARM' ELSE polling_tier END, \
                 updated_at = $2 \
             WHERE id = $1 \
             RETURNING {COLS}"
        );
        sqlx::query_as::<_, Source>(&sql)
            .bind(id)
            .bind(now)
            .bind(cursor)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Record a failed poll attempt: bump the failure count and move the
    /// source into QUARANTINE once the count reaches `threshold`.
    ///
    /// The attempt timestamp advances on failure too, so a broken source
    /// waits out its full tier interval instead of retrying every tick.
    pub async fn record_poll_failure(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
        threshold: i32,
    ) -> Result<Source, StoreError> {
        let sql = format!(
            "UPDATE sources SET \
                 last_polled_at = $2, \
                 tier_updated_at = CASE \
                     WHEN polling_tier <> 'QUARANTINE' AND poll_error_count + 1 >= $3 THEN $2 \
                     ELSE tier_updated_at END, \
                 polling_tier = CASE \
                     WHEN polling_tier <> 'QUARANTINE' AND poll_error_count + 1 >= $3 THEN 'QUARANTINE' \
                     ELSE polling_tier END, \
                 poll_error_count = poll_error_count + 1, \
                 updated_at = $2 \
             WHERE id = $1 \
             RETURNING {COLS}"
        );
        sqlx::query_as::<_, Source>(&sql)
            .bind(id)
            .bind(now)
            .bind(threshold)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Promote sources of a fresh feed to HOT with a priority boost.
    /// Quarantined sources keep their tier; the boost waits for recovery.
    pub async fn promote_to_hot(
        pool: &PgPool,
        ids: &[Uuid],
        boost_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE sources SET \
                 priority_boost_until = $2, \
                 tier_updated_at = CASE \
                     WHEN polling_tier IN ('HOT', 'QUARANTINE') THEN tier_updated_at \
                     ELSE $3 END, \
                 polling_tier = CASE \
                     WHEN polling_tier = 'QUARANTINE' THEN polling_tier \
                     ELSE 'HOT' END, \
                 updated_at = $3 \
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(boost_until)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Re-derive tiers from feed usage in one statement: sources
    /// referenced by an active feed are HOT, unreferenced sources fall
    /// to COLD. Quarantined sources are left for the poll path to
    /// recover; a boost only changes the effective interval at read
    /// time, never the stored tier.
    pub async fn sweep_tiers(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE sources s SET \
                 polling_tier = t.target, \
                 tier_updated_at = $1, \
                 updated_at = $1 \
             FROM ( \
                 SELECT s2.id, \
                        CASE WHEN EXISTS ( \
                            SELECT 1 FROM feed_sources fs \
                            JOIN feeds f ON f.id = fs.feed_id AND f.active \
                            WHERE fs.source_id = s2.id) \
                        THEN 'HOT' ELSE 'COLD' END AS target \
                 FROM sources s2 \
                 WHERE s2.polling_tier <> 'QUARANTINE' \
             ) t \
             WHERE s.id = t.id \
               AND s.polling_tier <> t.target \
               AND s.polling_tier <> 'QUARANTINE'",
        )
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
