//! Domain event message payloads.
//!
//! These are the inner payloads carried by [`Envelope`](crate::Envelope)s.
//! Each type represents one event that workers publish to a stream or
//! exchange over the validation bridge.

use chrono::{DateTime, Utc};
use depesche_core::{SourceType, ValidationType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to a source as announced by a user surface, before it is
/// resolved against (or inserted into) the source registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Kind of the source.
    pub source_type: SourceType,
    /// Canonical URL of the source.
    pub url: String,
}

/// Emitted after a poll stored new raw posts for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPostsCreated {
    /// Source the posts were fetched from.
    pub source_id: Uuid,
    /// Ids of the raw posts created by this poll, in insertion order.
    pub raw_post_ids: Vec<Uuid>,
    /// Kind of the source, so consumers can route without a lookup.
    pub source_type: SourceType,
}

/// Emitted when a user surface announces a newly created feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCreated {
    /// Id assigned to the feed by the announcing surface.
    pub feed_id: Uuid,
    /// Pipeline that will process posts for this feed.
    pub pipeline_id: Uuid,
    /// Owner of the feed.
    pub user_id: Uuid,
    /// Sources the feed draws from.
    pub sources: Vec<SourceRef>,
    /// Free-form instruction text for the feed's processor.
    #[serde(default)]
    pub prompt_text: String,
    /// Presentation kind of the feed (opaque to the backend).
    pub feed_type: String,
}

/// Emitted after a new feed's initial sync processed its first posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedInitialSync {
    /// Feed the sync ran for.
    pub feed_id: Uuid,
    /// Pipeline the sync ran under.
    pub pipeline_id: Uuid,
    /// Source whose backlog was synced.
    pub source_id: Uuid,
    /// Number of posts produced by the sync.
    pub post_count: u32,
}

/// Emitted when a pipeline run produced a processed post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCreated {
    /// The processed post.
    pub post_id: Uuid,
    /// Feed the post belongs to.
    pub feed_id: Uuid,
    /// Owner of the feed, for downstream notification fan-out.
    pub user_id: Uuid,
}

/// Payload of both digest subjects: a digest trigger carries its own
/// schedule so the executor can re-arm the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSchedule {
    /// Recurring digest job this trigger belongs to.
    pub job_id: Uuid,
    /// When this run was scheduled to fire.
    pub scheduled_at: DateTime<Utc>,
    /// Hours between runs (1 to 168).
    pub interval_hours: u32,
}

/// Validation request for a candidate source URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceValidateRequest {
    /// URL as entered by the user.
    pub url: String,
    /// Requested validation mode.
    pub validation_type: ValidationType,
}

/// Reply to a [`SourceValidateRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceValidateReply {
    /// Whether the URL can be ingested as requested.
    pub valid: bool,
    /// Source kind the validator settled on (for `auto` requests).
    #[serde(default)]
    pub detected_type: Option<SourceType>,
    /// Human-readable explanation, mainly for invalid URLs.
    #[serde(default)]
    pub message: String,
    /// Cleaned-up URL the caller should store instead of the input.
    #[serde(default)]
    pub normalized_url: Option<String>,
}

/// Worker health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Periodic heartbeat reporting worker liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHealth {
    /// Unique identifier for the worker.
    pub worker_id: String,
    /// Current health status.
    pub status: WorkerStatus,
}
