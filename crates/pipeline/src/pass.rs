//! Incremental pipeline pass: raw posts in, feed posts out.
//!
//! Each `raw_post.created` delivery triggers one pass per active feed of
//! the announced source. A pass reads the raw rows past the feed's
//! offset, runs the processor, stores the results, announces them, and
//! advances the offset past everything it read.
//!
//! Store and processor failures propagate so the delivery is nacked and
//! retried. The whole pass is idempotent: raw rows dedup on
//! `unique_code`, posts dedup per feed, and the offset only moves
//! forward, so a redelivered event cannot double-produce.

use depesche_rohrpost::events::{PostCreated, RawPostsCreated};
use depesche_rohrpost::{subjects, Envelope, QueuePublisher};
use depesche_store::{Feed, FeedStore, OffsetStore, PostStore, RawPostStore};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::processor::PostProcessor;

/// Process one `raw_post.created` delivery.
pub async fn handle_raw_posts_created(
    pool: &PgPool,
    publisher: &dyn QueuePublisher,
    processor: &dyn PostProcessor,
    envelope: &Envelope,
    batch_limit: i64,
) -> Result<(), PipelineError> {
    let event: RawPostsCreated = match envelope.decode() {
        Ok(event) => event,
        Err(err) => {
            // Malformed payloads never become valid on retry.
            error!(subject = %envelope.subject, %err, "dropping undecodable raw post event");
            return Ok(());
        }
    };

    let feeds = FeedStore::active_for_source(pool, event.source_id).await?;
    if feeds.is_empty() {
        debug!(source_id = %event.source_id, "no active feeds for source");
        return Ok(());
    }

    for feed in &feeds {
        run_pass(pool, publisher, processor, feed, event.source_id, batch_limit).await?;
    }
    Ok(())
}

/// One pass over a (feed, source) pair.
async fn run_pass(
    pool: &PgPool,
    publisher: &dyn QueuePublisher,
    processor: &dyn PostProcessor,
    feed: &Feed,
    source_id: Uuid,
    batch_limit: i64,
) -> Result<(), PipelineError> {
    let offset = OffsetStore::get(pool, feed.pipeline_id, source_id).await?;
    let after = offset.map(|o| (o.last_post_created_at, o.last_post_id));

    let batch = RawPostStore::list_after(pool, source_id, after, batch_limit).await?;
    let Some(newest) = batch.last().map(|raw| (raw.created_at, raw.id)) else {
        debug!(feed_id = %feed.id, %source_id, "pass found nothing past the offset");
        return Ok(());
    };

    let drafts = processor.process(feed, &batch).await?;
    let created = PostStore::insert_batch(pool, feed.id, &drafts).await?;

    for post in &created {
        announce_post(publisher, feed, post.id).await;
    }

    // Advance past everything read, not everything produced, so a
    // filtering processor never re-sees the rows it rejected.
    OffsetStore::advance(pool, feed.pipeline_id, source_id, newest.1, newest.0).await?;

    info!(
        feed_id = %feed.id,
        %source_id,
        read = batch.len(),
        created = created.len(),
        "pipeline pass complete"
    );
    Ok(())
}

/// Announce one processed post. A lost announcement is only logged:
/// the post row itself is durable and the next pass's readers see it.
async fn announce_post(publisher: &dyn QueuePublisher, feed: &Feed, post_id: Uuid) {
    let event = PostCreated {
        post_id,
        feed_id: feed.id,
        user_id: feed.user_id,
    };
    match Envelope::new(subjects::POST_CREATED, &event) {
        Ok(envelope) => {
            if let Err(err) = publisher.publish(&envelope).await {
                warn!(%post_id, feed_id = %feed.id, %err, "post announcement failed");
            }
        }
        Err(err) => warn!(%post_id, %err, "post announcement could not be encoded"),
    }
}
