//! Poll loop: scan for due sources, fetch them concurrently, store and
//! announce what was new.
//!
//! Each tick claims the due set once and waits for all polls before the
//! next tick, so a slow source can never be polled twice in parallel.
//! Per-source outcome handling:
//! - fetch or store failure → `record_poll_failure` (quarantine path)
//! - publish failure → logged only; the rows are durable and the next
//!   announcement for the source re-covers them via the offset scan
//! - otherwise → `record_poll_success` with the new cursor

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use depesche_core::config::SchedulerConfig;
use depesche_core::PollingTier;
use depesche_rohrpost::events::RawPostsCreated;
use depesche_rohrpost::{subjects, Envelope, QueuePublisher};
use depesche_store::{RawPostStore, Source, SourceStore};
use sqlx::PgPool;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::fetch::SourceFetcher;

/// Upper bound on sources claimed per tick.
const DUE_BATCH: i64 = 100;

pub struct Poller {
    pool: PgPool,
    fetcher: Arc<dyn SourceFetcher>,
    publisher: Arc<dyn QueuePublisher>,
    poll_tick: Duration,
    quarantine_threshold: i32,
    max_concurrent: usize,
}

impl Poller {
    pub fn new(
        pool: PgPool,
        fetcher: Arc<dyn SourceFetcher>,
        publisher: Arc<dyn QueuePublisher>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            pool,
            fetcher,
            publisher,
            poll_tick: Duration::from_secs(config.poll_tick_secs),
            quarantine_threshold: config.quarantine_threshold as i32,
            max_concurrent: config.max_concurrent_polls as usize,
        }
    }

    /// Run the poll loop until `shutdown` is notified.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        info!(
            tick_secs = self.poll_tick.as_secs(),
            max_concurrent = self.max_concurrent,
            "poller running"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_tick) => {}
                _ = shutdown.notified() => {
                    info!("poller stopping");
                    return;
                }
            }

            if let Err(error) = self.tick().await {
                warn!(%error, "poll tick failed");
            }
        }
    }

    /// Poll every due source once, bounded by the concurrency limit.
    async fn tick(&self) -> Result<(), IngestError> {
        let due = SourceStore::find_due(&self.pool, Utc::now(), DUE_BATCH).await?;
        if due.is_empty() {
            return Ok(());
        }
        debug!(due = due.len(), "polling due sources");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(due.len());

        for source in due {
            let semaphore = semaphore.clone();
            let pool = self.pool.clone();
            let fetcher = self.fetcher.clone();
            let publisher = self.publisher.clone();
            let threshold = self.quarantine_threshold;

            handles.push(tokio::spawn(async move {
                // The semaphore lives as long as every permit holder.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                Self::poll_source(&pool, &*fetcher, &*publisher, source, threshold).await;
            }));
        }

        for handle in handles {
            if let Err(error) = handle.await {
                warn!(%error, "poll task panicked");
            }
        }
        Ok(())
    }

    async fn poll_source(
        pool: &PgPool,
        fetcher: &dyn SourceFetcher,
        publisher: &dyn QueuePublisher,
        source: Source,
        threshold: i32,
    ) {
        let now = Utc::now();

        let outcome = match fetcher.fetch_new(&source).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(source_id = %source.id, url = %source.url, %error, "poll fetch failed");
                Self::mark_failure(pool, &source, threshold).await;
                return;
            }
        };

        let raw_posts: Vec<_> = outcome
            .items
            .into_iter()
            .map(|item| item.into_raw_post())
            .collect();

        let created = if raw_posts.is_empty() {
            Vec::new()
        } else {
            match RawPostStore::insert_batch(pool, source.id, &raw_posts).await {
                Ok(created) => created,
                Err(error) => {
                    warn!(source_id = %source.id, %error, "storing fetched items failed");
                    Self::mark_failure(pool, &source, threshold).await;
                    return;
                }
            }
        };

        if !created.is_empty() {
            debug!(
                source_id = %source.id,
                fetched = raw_posts.len(),
                created = created.len(),
                "stored new raw posts"
            );
            let event = RawPostsCreated {
                source_id: source.id,
                raw_post_ids: created.iter().map(|p| p.id).collect(),
                source_type: source.kind(),
            };
            match Envelope::new(subjects::RAW_POST_CREATED, &event) {
                Ok(envelope) => {
                    if let Err(error) = publisher.publish(&envelope).await {
                        warn!(source_id = %source.id, %error, "raw post announcement failed");
                    }
                }
                Err(error) => {
                    warn!(source_id = %source.id, %error, "raw post event serialization failed");
                }
            }
        }

        if let Err(error) =
            SourceStore::record_poll_success(pool, source.id, now, outcome.cursor.as_deref()).await
        {
            warn!(source_id = %source.id, %error, "recording poll success failed");
        }
    }

    async fn mark_failure(pool: &PgPool, source: &Source, threshold: i32) {
        match SourceStore::record_poll_failure(pool, source.id, Utc::now(), threshold).await {
            Ok(updated)
                if updated.tier() == PollingTier::Quarantine
                    && source.tier() != PollingTier::Quarantine =>
            {
                warn!(
                    source_id = %source.id,
                    url = %source.url,
                    errors = updated.poll_error_count,
                    "source quarantined after repeated poll failures"
                );
            }
            Ok(_) => {}
            Err(error) => {
                warn!(source_id = %source.id, %error, "recording poll failure failed");
            }
        }
    }
}
