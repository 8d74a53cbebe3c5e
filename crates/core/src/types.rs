//! Shared domain types used across the workspace.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of content source a feed can draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Messaging channel polled through a channel-platform client.
    Channel,
    /// RSS or Atom feed fetched over HTTP.
    Rss,
    /// Plain web page fetched over HTTP.
    Website,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Channel => "channel",
            SourceType::Rss => "rss",
            SourceType::Website => "website",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "channel" => Some(SourceType::Channel),
            "rss" => Some(SourceType::Rss),
            "website" => Some(SourceType::Website),
            _ => None,
        }
    }

    /// Prefix used when deriving deduplication codes for posts of this source.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            SourceType::Channel => "tg",
            SourceType::Rss => "rss",
            SourceType::Website => "web",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation mode requested for a candidate source URL.
///
/// `Auto` probes for a feed first and falls back to treating the URL
/// as a plain website.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    Channel,
    Rss,
    Website,
    Auto,
}

impl ValidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationType::Channel => "channel",
            ValidationType::Rss => "rss",
            ValidationType::Website => "website",
            ValidationType::Auto => "auto",
        }
    }
}

/// Adaptive polling tier of a source.
///
/// The tier decides how often the poller revisits a source. Tiers are
/// stored as text in the database, so the serde/string representation
/// is part of the schema contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollingTier {
    /// Sources actively referenced by at least one feed.
    Hot,
    /// Default tier for new and lightly used sources.
    Warm,
    /// Sources with no feed referencing them.
    Cold,
    /// Sources that kept failing and are polled rarely until they recover.
    Quarantine,
}

impl PollingTier {
    /// Minimum seconds between poll attempts for this tier.
    pub const fn interval_secs(self) -> i64 {
        match self {
            PollingTier::Hot => 30,
            PollingTier::Warm => 120,
            PollingTier::Cold => 600,
            PollingTier::Quarantine => 3600,
        }
    }

    pub const fn interval(self) -> Duration {
        Duration::from_secs(self.interval_secs() as u64)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PollingTier::Hot => "HOT",
            PollingTier::Warm => "WARM",
            PollingTier::Cold => "COLD",
            PollingTier::Quarantine => "QUARANTINE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HOT" => Some(PollingTier::Hot),
            "WARM" => Some(PollingTier::Warm),
            "COLD" => Some(PollingTier::Cold),
            "QUARANTINE" => Some(PollingTier::Quarantine),
            _ => None,
        }
    }
}

impl std::fmt::Display for PollingTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
