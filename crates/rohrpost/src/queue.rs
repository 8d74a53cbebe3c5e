//! Durable queue backed by the relational store.
//!
//! Envelopes are rows in `rohrpost_messages`. A publish resolves the
//! catalog stream from the subject and inserts one row; consumers pull
//! with `FOR UPDATE SKIP LOCKED` so concurrent workers never claim the
//! same message:
//! - **pull** claims up to `max` due messages and hides them for the
//!   visibility window, incrementing `attempt_count`
//! - **ack** deletes the row, **nack** clears the claim for immediate
//!   redelivery
//! - an expired claim makes the message deliverable again on its own
//!
//! Delayed delivery is just a `deliver_at` in the future, which is how
//! digest triggers wait for their run time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{stream_for_subject, streams, Retention, StreamSpec};
use crate::envelope::Envelope;
use crate::error::RohrpostError;
use crate::traits::QueuePublisher;

/// A claimed message handed to a consumer.
///
/// The consumer must `ack` (done) or `nack` (retry now) the delivery
/// by its id; doing neither redelivers it when the claim expires.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Row id, used for ack/nack.
    pub id: i64,
    pub envelope: Envelope,
    /// How many times this message has been claimed, this claim included.
    pub attempt: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    subject: String,
    payload: serde_json::Value,
    correlation_id: Uuid,
    published_at: DateTime<Utc>,
    version: i16,
    attempt_count: i32,
}

impl From<MessageRow> for Delivery {
    fn from(row: MessageRow) -> Self {
        Delivery {
            id: row.id,
            envelope: Envelope {
                subject: row.subject,
                payload: row.payload,
                published_at: row.published_at,
                correlation_id: row.correlation_id,
                version: row.version as u16,
            },
            attempt: row.attempt_count,
        }
    }
}

/// Handle to the durable queue. Cheap to clone, shares the pool.
#[derive(Clone)]
pub struct DurableQueue {
    pool: PgPool,
}

impl DurableQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one envelope on the stream its subject maps to.
    async fn insert(
        &self,
        envelope: &Envelope,
        deliver_at: DateTime<Utc>,
    ) -> Result<i64, RohrpostError> {
        let stream = stream_for_subject(&envelope.subject)
            .ok_or_else(|| RohrpostError::UnknownSubject(envelope.subject.clone()))?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO rohrpost_messages \
                 (stream, subject, payload, correlation_id, version, published_at, deliver_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id",
        )
        .bind(stream.name)
        .bind(&envelope.subject)
        .bind(&envelope.payload)
        .bind(envelope.correlation_id)
        .bind(envelope.version as i16)
        .bind(envelope.published_at)
        .bind(deliver_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            subject = %envelope.subject,
            stream = stream.name,
            message_id = id,
            correlation_id = %envelope.correlation_id,
            "published envelope"
        );
        Ok(id)
    }

    /// Claim up to `max` due messages from a stream.
    ///
    /// Claimed messages stay invisible to other pulls until `visibility`
    /// elapses or the consumer nacks them.
    pub async fn pull(
        &self,
        stream: &StreamSpec,
        max: i64,
        visibility: Duration,
    ) -> Result<Vec<Delivery>, RohrpostError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "UPDATE rohrpost_messages \
             SET claimed_until = now() + make_interval(secs => $3), \
                 attempt_count = attempt_count + 1 \
             WHERE id IN ( \
                 SELECT id FROM rohrpost_messages \
                 WHERE stream = $1 \
                   AND deliver_at <= now() \
                   AND (claimed_until IS NULL OR claimed_until <= now()) \
                 ORDER BY deliver_at, id \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, subject, payload, correlation_id, published_at, version, attempt_count",
        )
        .bind(stream.name)
        .bind(max)
        .bind(visibility.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Delivery::from).collect())
    }

    /// Acknowledge a delivery: the message is done and removed.
    pub async fn ack(&self, delivery_id: i64) -> Result<(), RohrpostError> {
        sqlx::query("DELETE FROM rohrpost_messages WHERE id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Give a delivery back: clears the claim so the message is
    /// immediately eligible for redelivery.
    pub async fn nack(&self, delivery_id: i64) -> Result<(), RohrpostError> {
        sqlx::query("UPDATE rohrpost_messages SET claimed_until = NULL WHERE id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete messages of a bounded-time stream that outlived its
    /// retention. Work-queue streams are never purged.
    pub async fn purge_expired(&self, stream: &StreamSpec) -> Result<u64, RohrpostError> {
        let Retention::BoundedTime { max_age } = stream.retention else {
            return Ok(0);
        };

        let result = sqlx::query(
            "DELETE FROM rohrpost_messages \
             WHERE stream = $1 AND published_at < now() - make_interval(secs => $2)",
        )
        .bind(stream.name)
        .bind(max_age.as_secs_f64())
        .execute(&self.pool)
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(stream = stream.name, purged, "purged expired messages");
        }
        Ok(purged)
    }

    /// Purge every bounded-time stream in the catalog.
    pub async fn purge_all_expired(&self) -> Result<u64, RohrpostError> {
        let mut total = 0;
        for stream in streams::ALL {
            total += self.purge_expired(stream).await?;
        }
        Ok(total)
    }

    /// Number of messages currently deliverable on a stream.
    pub async fn depth(&self, stream: &StreamSpec) -> Result<i64, RohrpostError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rohrpost_messages WHERE stream = $1 AND deliver_at <= now()",
        )
        .bind(stream.name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// Purges expired bounded-time messages until `shutdown` is notified.
///
/// Every worker binary spawns one of these; the deletes are idempotent,
/// so overlapping purgers cost nothing but a no-op statement.
pub async fn run_purge_loop(queue: DurableQueue, interval: Duration, shutdown: Arc<Notify>) {
    info!(interval_secs = interval.as_secs(), "queue purge running");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.notified() => {
                info!("queue purge stopping");
                return;
            }
        }

        if let Err(error) = queue.purge_all_expired().await {
            warn!(%error, "queue purge failed");
        }
    }
}

#[async_trait]
impl QueuePublisher for DurableQueue {
    async fn publish(&self, envelope: &Envelope) -> Result<(), RohrpostError> {
        self.insert(envelope, Utc::now()).await?;
        Ok(())
    }

    async fn publish_delayed(
        &self,
        envelope: &Envelope,
        deliver_at: DateTime<Utc>,
    ) -> Result<(), RohrpostError> {
        self.insert(envelope, deliver_at).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::subjects;

    /// Pool that never connects; good enough for paths that fail or
    /// return before touching the database.
    fn lazy_pool() -> PgPool {
        PgPool::connect_lazy("postgres://localhost/unused").unwrap()
    }

    #[test]
    fn delivery_from_row_rebuilds_envelope() {
        let cid = Uuid::new_v4();
        let published = Utc::now();
        let row = MessageRow {
            id: 7,
            subject: subjects::POST_CREATED.into(),
            payload: serde_json::json!({"post_id": "x"}),
            correlation_id: cid,
            published_at: published,
            version: 1,
            attempt_count: 3,
        };

        let delivery = Delivery::from(row);
        assert_eq!(delivery.id, 7);
        assert_eq!(delivery.attempt, 3);
        assert_eq!(delivery.envelope.subject, subjects::POST_CREATED);
        assert_eq!(delivery.envelope.correlation_id, cid);
        assert_eq!(delivery.envelope.published_at, published);
        assert_eq!(delivery.envelope.version, 1);
    }

    #[tokio::test]
    async fn publish_rejects_uncataloged_subject() {
        let queue = DurableQueue::new(lazy_pool());
        let env = Envelope::new("depesche.nobody.cares", &()).unwrap();

        let err = queue.publish(&env).await.unwrap_err();
        assert!(matches!(err, RohrpostError::UnknownSubject(s) if s == "depesche.nobody.cares"));
    }

    #[tokio::test]
    async fn purge_is_a_noop_for_work_queues() {
        let queue = DurableQueue::new(lazy_pool());
        let purged = queue.purge_expired(&streams::INGEST).await.unwrap();
        assert_eq!(purged, 0);
    }
}
