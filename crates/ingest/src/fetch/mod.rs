//! Source fetchers.
//!
//! Each source kind has its own fetcher producing [`FetchedItem`]s with
//! a precomputed unique code, so the poll loop can stay generic: store
//! the batch, announce what was new, advance the cursor.

pub mod channel;
pub mod rss;
pub mod website;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depesche_core::SourceType;
use depesche_store::{NewRawPost, Source};

use crate::error::IngestError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);
pub(crate) const USER_AGENT: &str = concat!("depesche/", env!("CARGO_PKG_VERSION"));

/// One item pulled from a source, normalized across source kinds.
#[derive(Debug, Clone)]
pub struct FetchedItem {
    /// Dedup key, already derived per the source kind's code scheme.
    pub unique_code: String,
    pub title: Option<String>,
    pub content: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl FetchedItem {
    pub fn into_raw_post(self) -> NewRawPost {
        NewRawPost {
            unique_code: self.unique_code,
            title: self.title,
            content: self.content,
            url: self.url,
            author: self.author,
            published_at: self.published_at,
        }
    }
}

/// Result of polling one source once.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub items: Vec<FetchedItem>,
    /// New fetch cursor to persist, if the source kind tracks one.
    pub cursor: Option<String>,
}

/// Pulls whatever a source has published since the last poll.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_new(&self, source: &Source) -> Result<FetchOutcome, IngestError>;
}

/// Production fetcher dispatching on the source kind.
pub struct DefaultFetcher {
    http: reqwest::Client,
}

impl DefaultFetcher {
    pub fn new() -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SourceFetcher for DefaultFetcher {
    async fn fetch_new(&self, source: &Source) -> Result<FetchOutcome, IngestError> {
        match source.kind() {
            SourceType::Rss => rss::fetch_new(&self.http, source).await,
            SourceType::Website => website::fetch_new(&self.http, source).await,
            SourceType::Channel => channel::fetch_new(source).await,
        }
    }
}
