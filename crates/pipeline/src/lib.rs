//! Post pipeline: consumes ingest and feed streams, produces feed posts.

pub mod bootstrap;
pub mod digests;
pub mod error;
pub mod pass;
pub mod processor;

pub use bootstrap::handle_feed_created;
pub use digests::handle_digest_envelope;
pub use error::{PipelineError, ProcessorError};
pub use pass::handle_raw_posts_created;
pub use processor::{DigestRunner, NoopDigestRunner, PostProcessor, RelayProcessor};
