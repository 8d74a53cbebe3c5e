//! Deterministic deduplication codes for raw posts.
//!
//! Every raw post carries a `unique_code` derived from its origin, so
//! re-fetching the same item always produces the same code and the
//! unique index on the column turns duplicates into no-ops.

use sha2::{Digest, Sha256};

use crate::types::SourceType;

/// Number of hex characters kept from the digest for hashed codes.
const HASH_CODE_LEN: usize = 32;

/// Code for a channel message, built from the channel and message ids.
pub fn channel_code(channel_id: i64, message_id: i64) -> String {
    format!("tg_{channel_id}_{message_id}")
}

/// Code for an item fetched from an RSS feed or a web page.
///
/// The origin (feed or page URL) and the item's native identifier are
/// hashed together, so the same item seen through two different
/// origins yields two distinct codes.
pub fn hashed_code(kind: SourceType, origin: &str, native_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(origin.as_bytes());
    hasher.update(b"\n");
    hasher.update(native_id.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex.truncate(HASH_CODE_LEN);

    format!("{}_{}", kind.code_prefix(), hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_code_matches_expected_shape() {
        assert_eq!(channel_code(123, 456), "tg_123_456");
    }

    #[test]
    fn hashed_code_is_deterministic() {
        let a = hashed_code(SourceType::Rss, "https://example.org/feed", "guid-1");
        let b = hashed_code(SourceType::Rss, "https://example.org/feed", "guid-1");
        assert_eq!(a, b);
    }

    #[test]
    fn hashed_code_distinguishes_origins_and_items() {
        let base = hashed_code(SourceType::Rss, "https://example.org/feed", "guid-1");
        let other_item = hashed_code(SourceType::Rss, "https://example.org/feed", "guid-2");
        let other_origin = hashed_code(SourceType::Rss, "https://other.org/feed", "guid-1");
        assert_ne!(base, other_item);
        assert_ne!(base, other_origin);
    }

    #[test]
    fn hashed_code_uses_source_prefix_and_fixed_length() {
        let rss = hashed_code(SourceType::Rss, "o", "n");
        let web = hashed_code(SourceType::Website, "o", "n");
        assert!(rss.starts_with("rss_"));
        assert!(web.starts_with("web_"));
        assert_eq!(rss.len(), "rss_".len() + HASH_CODE_LEN);
        assert_eq!(web.len(), "web_".len() + HASH_CODE_LEN);
    }
}
