//! Processing plugins for the post pipeline.
//!
//! A [`PostProcessor`] turns a batch of raw posts into the posts a feed
//! should carry. The relay processor passes content through unchanged;
//! summarizing or filtering processors implement the same trait and slot
//! into the consumer unmodified.

use async_trait::async_trait;
use depesche_store::{Feed, NewPost, RawPost};
use tracing::info;
use uuid::Uuid;

use crate::error::ProcessorError;

#[async_trait]
pub trait PostProcessor: Send + Sync {
    /// Derive feed posts from a batch of raw posts.
    ///
    /// The output need not be one-to-one with the input: a filtering
    /// processor may return fewer posts, a digesting one a single post.
    /// Offsets advance past the whole input batch either way.
    async fn process(&self, feed: &Feed, batch: &[RawPost]) -> Result<Vec<NewPost>, ProcessorError>;
}

/// Passes raw posts through verbatim, one post per raw post.
pub struct RelayProcessor;

#[async_trait]
impl PostProcessor for RelayProcessor {
    async fn process(
        &self,
        _feed: &Feed,
        batch: &[RawPost],
    ) -> Result<Vec<NewPost>, ProcessorError> {
        Ok(batch
            .iter()
            .map(|raw| NewPost {
                raw_post_id: Some(raw.id),
                title: raw.title.clone(),
                content: raw.content.clone(),
                source_url: raw.url.clone().unwrap_or_else(|| raw.unique_code.clone()),
            })
            .collect())
    }
}

#[async_trait]
pub trait DigestRunner: Send + Sync {
    /// Execute one digest job.
    async fn run(&self, job_id: Uuid) -> Result<(), ProcessorError>;
}

/// Records digest executions without producing output.
///
/// Stands in until a digest renderer is wired up; the scheduling cycle
/// around it is fully live.
pub struct NoopDigestRunner;

#[async_trait]
impl DigestRunner for NoopDigestRunner {
    async fn run(&self, job_id: Uuid) -> Result<(), ProcessorError> {
        info!(%job_id, "digest executed (no renderer configured)");
        Ok(())
    }
}
