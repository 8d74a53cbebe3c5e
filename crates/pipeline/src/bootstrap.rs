//! Feed bootstrap: turn a `feed.created` announcement into a working feed.
//!
//! Bootstrapping registers the feed row, resolves its sources against
//! the registry, boosts them so fresh content arrives quickly, and runs
//! an initial sync per source so the feed is not empty while the first
//! polls come in. The offset is seeded at each source's newest raw post,
//! which hands the feed over to the incremental pass cleanly.

use chrono::{Duration, Utc};
use depesche_rohrpost::events::{FeedCreated, FeedInitialSync};
use depesche_rohrpost::{subjects, Envelope, QueuePublisher};
use depesche_store::{Feed, FeedStore, NewFeed, OffsetStore, PostStore, RawPostStore, SourceStore};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::processor::PostProcessor;

/// Process one `feed.created` delivery.
pub async fn handle_feed_created(
    pool: &PgPool,
    publisher: &dyn QueuePublisher,
    processor: &dyn PostProcessor,
    envelope: &Envelope,
    initial_sync_limit: i64,
    boost_minutes: u32,
) -> Result<(), PipelineError> {
    let event: FeedCreated = match envelope.decode() {
        Ok(event) => event,
        Err(err) => {
            error!(subject = %envelope.subject, %err, "dropping undecodable feed announcement");
            return Ok(());
        }
    };

    let draft = NewFeed {
        id: event.feed_id,
        pipeline_id: event.pipeline_id,
        user_id: event.user_id,
        feed_type: event.feed_type.clone(),
        prompt_text: event.prompt_text.clone(),
    };
    let Some(feed) = FeedStore::insert_if_absent(pool, &draft).await? else {
        // Redelivered announcement; the first delivery did the work.
        debug!(feed_id = %event.feed_id, "feed already bootstrapped");
        return Ok(());
    };

    let mut source_ids = Vec::with_capacity(event.sources.len());
    for source_ref in &event.sources {
        let source =
            SourceStore::get_or_create(pool, source_ref.source_type, &source_ref.url, None)
                .await?;
        FeedStore::link_source(pool, feed.id, source.id).await?;
        source_ids.push(source.id);
    }

    let now = Utc::now();
    let boost_until = now + Duration::minutes(i64::from(boost_minutes));
    SourceStore::promote_to_hot(pool, &source_ids, boost_until, now).await?;

    for source_id in &source_ids {
        initial_sync(pool, publisher, processor, &feed, *source_id, initial_sync_limit).await?;
    }

    info!(
        feed_id = %feed.id,
        pipeline_id = %feed.pipeline_id,
        sources = source_ids.len(),
        "feed bootstrapped"
    );
    Ok(())
}

/// Sync a fresh feed from one source's newest backlog.
async fn initial_sync(
    pool: &PgPool,
    publisher: &dyn QueuePublisher,
    processor: &dyn PostProcessor,
    feed: &Feed,
    source_id: Uuid,
    limit: i64,
) -> Result<(), PipelineError> {
    let backlog = RawPostStore::latest_for_source(pool, source_id, limit).await?;

    let post_count = if backlog.is_empty() {
        0
    } else {
        let drafts = processor.process(feed, &backlog).await?;
        PostStore::insert_batch(pool, feed.id, &drafts).await?.len()
    };

    // Seed the offset at the source's newest row so the incremental
    // pass starts exactly where the sync stopped. Seeding never moves
    // an existing offset, so a redelivered announcement cannot rewind.
    if let Some(newest) = RawPostStore::newest_for_source(pool, source_id).await? {
        OffsetStore::seed(pool, feed.pipeline_id, source_id, newest.id, newest.created_at)
            .await?;
    }

    announce_sync(publisher, feed, source_id, post_count as u32).await;
    Ok(())
}

/// Announce a completed initial sync. Lost announcements are logged
/// only; the synced posts are already durable.
async fn announce_sync(publisher: &dyn QueuePublisher, feed: &Feed, source_id: Uuid, post_count: u32) {
    let event = FeedInitialSync {
        feed_id: feed.id,
        pipeline_id: feed.pipeline_id,
        source_id,
        post_count,
    };
    match Envelope::new(subjects::FEED_INITIAL_SYNC, &event) {
        Ok(envelope) => {
            if let Err(err) = publisher.publish(&envelope).await {
                warn!(feed_id = %feed.id, %source_id, %err, "initial sync announcement failed");
            }
        }
        Err(err) => warn!(feed_id = %feed.id, %err, "initial sync announcement could not be encoded"),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::DateTime;
    use depesche_rohrpost::RohrpostError;

    use crate::processor::RelayProcessor;

    use super::*;

    struct UnusedPublisher;

    #[async_trait]
    impl QueuePublisher for UnusedPublisher {
        async fn publish(&self, _: &Envelope) -> Result<(), RohrpostError> {
            panic!("nothing should be published");
        }

        async fn publish_delayed(
            &self,
            _: &Envelope,
            _: DateTime<Utc>,
        ) -> Result<(), RohrpostError> {
            panic!("nothing should be published");
        }
    }

    #[tokio::test]
    async fn undecodable_announcements_are_dropped_not_retried() {
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let envelope =
            Envelope::new(subjects::FEED_CREATED, &serde_json::json!({"feed": "nope"})).unwrap();

        handle_feed_created(&pool, &UnusedPublisher, &RelayProcessor, &envelope, 5, 60)
            .await
            .unwrap();
    }
}
