//! Subject constants for stream routing.
//!
//! Subjects follow the pattern `depesche.<domain>.<event>` for consistent
//! namespace-qualified routing across all workers.

// ── Ingest subjects ───────────────────────────────────────────────────────

/// Fired after a poll stored at least one new raw post.
pub const RAW_POST_CREATED: &str = "depesche.raw_post.created";

// ── Feed subjects ─────────────────────────────────────────────────────────

/// Fired when a user surface announces a newly created feed.
pub const FEED_CREATED: &str = "depesche.feed.created";

/// Fired after a new feed's initial sync processed its first posts.
pub const FEED_INITIAL_SYNC: &str = "depesche.feed.initial_sync";

// ── Pipeline subjects ─────────────────────────────────────────────────────

/// Fired when a pipeline run produced a processed post.
pub const POST_CREATED: &str = "depesche.post.created";

// ── Digest subjects ───────────────────────────────────────────────────────

/// Scheduled digest trigger, delivered when its run time arrives.
pub const DIGEST_PENDING: &str = "depesche.digest.pending";

/// Immediate digest execution order, forwarded from a due trigger.
pub const DIGEST_EXECUTE: &str = "depesche.digest.execute";

// ── Worker subjects ───────────────────────────────────────────────────────

/// Periodic worker health heartbeat.
pub const WORKER_HEALTH: &str = "depesche.worker.health";

// ── Bridge subjects (request/reply, never queued) ─────────────────────────

/// Validation request for a candidate source URL.
pub const SOURCE_VALIDATE: &str = "depesche.source.validate";

/// Reply to a validation request.
pub const SOURCE_VALIDATE_REPLY: &str = "depesche.source.validate.reply";
