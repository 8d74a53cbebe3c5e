//! Channel fetcher.
//!
//! Channel ingestion runs in the platform connector service, which
//! stores raw posts itself using [`depesche_core::codes::channel_code`]
//! identities and announces them on `raw_post.created`. Polling here
//! only keeps the cursor bookkeeping alive so the source stays healthy.
//!
//! TODO: move the connector's channel client behind [`SourceFetcher`]
//! so channel sources are polled in-process like the other kinds.
//!
//! [`SourceFetcher`]: crate::fetch::SourceFetcher

use depesche_store::Source;
use tracing::debug;

use crate::error::IngestError;
use crate::fetch::FetchOutcome;

pub async fn fetch_new(source: &Source) -> Result<FetchOutcome, IngestError> {
    debug!(
        source_id = %source.id,
        cursor = ?source.last_message_id,
        "channel poll delegated to the platform connector"
    );
    Ok(FetchOutcome {
        items: Vec::new(),
        cursor: source.last_message_id.clone(),
    })
}
