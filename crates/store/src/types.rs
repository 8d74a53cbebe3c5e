//! Row types for the relational store.
//!
//! Each struct mirrors one table; `New*` structs carry the caller-supplied
//! columns for inserts.

use chrono::{DateTime, Utc};
use depesche_core::{PollingTier, SourceType};
use uuid::Uuid;

/// A content source registered for polling.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Source {
    pub id: Uuid,
    pub source_type: String,
    pub url: String,
    pub title: Option<String>,
    pub polling_tier: String,
    pub tier_updated_at: DateTime<Utc>,
    pub priority_boost_until: Option<DateTime<Utc>>,
    pub last_polled_at: Option<DateTime<Utc>>,
    /// Source-kind specific fetch cursor (e.g. last seen channel message id).
    pub last_message_id: Option<String>,
    pub poll_error_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// Typed source kind. The column carries a CHECK constraint, so the
    /// fallback only triggers on schema drift.
    pub fn kind(&self) -> SourceType {
        SourceType::parse(&self.source_type).unwrap_or(SourceType::Website)
    }

    /// Typed polling tier, same CHECK-constraint caveat as [`Source::kind`].
    pub fn tier(&self) -> PollingTier {
        PollingTier::parse(&self.polling_tier).unwrap_or(PollingTier::Warm)
    }

    /// Whether the priority boost is still running at `now`.
    pub fn boost_active(&self, now: DateTime<Utc>) -> bool {
        self.priority_boost_until.map_or(false, |until| until > now)
    }
}

/// A feed owned by a user, fed by one or more sources.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub user_id: Uuid,
    pub feed_type: String,
    pub prompt_text: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns supplied when bootstrapping a feed from its announcement.
#[derive(Debug, Clone)]
pub struct NewFeed {
    /// Feed id assigned by the announcing surface.
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub user_id: Uuid,
    pub feed_type: String,
    pub prompt_text: String,
}

/// A raw post exactly as fetched, before pipeline processing.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct RawPost {
    pub id: Uuid,
    pub source_id: Uuid,
    pub unique_code: String,
    pub title: Option<String>,
    pub content: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Columns supplied when storing a fetched item.
#[derive(Debug, Clone)]
pub struct NewRawPost {
    pub unique_code: String,
    pub title: Option<String>,
    pub content: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A processed post belonging to a feed.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub raw_post_id: Option<Uuid>,
    pub title: Option<String>,
    pub content: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

/// Columns supplied by a processor for one produced post.
#[derive(Debug, Clone)]
pub struct NewPost {
    /// Raw post this was derived from, if the processor kept the link.
    pub raw_post_id: Option<Uuid>,
    pub title: Option<String>,
    pub content: String,
    pub source_url: String,
}

/// Processing high-water mark of one (pipeline, source) pair.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct PipelineOffset {
    pub pipeline_id: Uuid,
    pub source_id: Uuid,
    pub last_post_id: Uuid,
    pub last_post_created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
