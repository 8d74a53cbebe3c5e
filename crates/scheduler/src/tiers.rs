//! Tier transition rules for source polling.
//!
//! The store applies these rules atomically inside single UPDATE
//! statements; the pure forms here document the machine and let the
//! poll loop decide without a round trip.

use chrono::{DateTime, Duration, Utc};
use depesche_core::PollingTier;
use depesche_store::Source;

/// Tier a source is effectively polled at right now.
///
/// An active priority boost lifts any tier to HOT. Quarantine is never
/// lifted; a quarantined source stays on the slow lane until a poll
/// succeeds.
pub fn effective_tier(source: &Source, now: DateTime<Utc>) -> PollingTier {
    let tier = source.tier();
    if tier == PollingTier::Quarantine {
        return tier;
    }
    if source.boost_active(now) {
        PollingTier::Hot
    } else {
        tier
    }
}

/// Whether the source's effective interval has elapsed since the last poll.
///
/// A source that has never been polled is always due.
pub fn due_for_poll(source: &Source, now: DateTime<Utc>) -> bool {
    match source.last_polled_at {
        None => true,
        Some(last) => {
            let interval = Duration::seconds(effective_tier(source, now).interval_secs());
            now - last >= interval
        }
    }
}

/// Tier after a successful poll.
///
/// Success releases quarantine back to WARM, not HOT; the sweep will
/// promote the source again if feeds still reference it. Every other
/// tier is left alone.
pub fn tier_after_success(current: PollingTier) -> PollingTier {
    match current {
        PollingTier::Quarantine => PollingTier::Warm,
        other => other,
    }
}

/// Tier after a failed poll, given the error count including this failure.
pub fn tier_after_failure(current: PollingTier, error_count: u32, threshold: u32) -> PollingTier {
    if current != PollingTier::Quarantine && error_count >= threshold {
        PollingTier::Quarantine
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn source(tier: PollingTier) -> Source {
        let now = Utc::now();
        Source {
            id: Uuid::new_v4(),
            source_type: "rss".to_string(),
            url: "https://example.org/feed.xml".to_string(),
            title: None,
            polling_tier: tier.as_str().to_string(),
            tier_updated_at: now,
            priority_boost_until: None,
            last_polled_at: None,
            last_message_id: None,
            poll_error_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn never_polled_source_is_due() {
        let s = source(PollingTier::Cold);
        assert!(due_for_poll(&s, Utc::now()));
    }

    #[test]
    fn warm_source_becomes_due_when_interval_elapses() {
        let now = Utc::now();
        let mut s = source(PollingTier::Warm);

        s.last_polled_at = Some(now - Duration::seconds(60));
        assert!(!due_for_poll(&s, now));

        s.last_polled_at = Some(now - Duration::seconds(120));
        assert!(due_for_poll(&s, now));
    }

    #[test]
    fn boost_polls_a_warm_source_on_the_hot_interval() {
        let now = Utc::now();
        let mut s = source(PollingTier::Warm);
        s.priority_boost_until = Some(now + Duration::minutes(30));
        s.last_polled_at = Some(now - Duration::seconds(45));

        assert_eq!(effective_tier(&s, now), PollingTier::Hot);
        assert!(due_for_poll(&s, now));
    }

    #[test]
    fn expired_boost_falls_back_to_the_stored_tier() {
        let now = Utc::now();
        let mut s = source(PollingTier::Cold);
        s.priority_boost_until = Some(now - Duration::minutes(1));

        assert_eq!(effective_tier(&s, now), PollingTier::Cold);
    }

    #[test]
    fn boost_never_lifts_quarantine() {
        let now = Utc::now();
        let mut s = source(PollingTier::Quarantine);
        s.priority_boost_until = Some(now + Duration::hours(1));

        assert_eq!(effective_tier(&s, now), PollingTier::Quarantine);
    }

    #[test]
    fn failures_below_threshold_keep_the_tier() {
        assert_eq!(
            tier_after_failure(PollingTier::Hot, 9, 10),
            PollingTier::Hot
        );
    }

    #[test]
    fn failure_at_threshold_quarantines() {
        assert_eq!(
            tier_after_failure(PollingTier::Hot, 10, 10),
            PollingTier::Quarantine
        );
        assert_eq!(
            tier_after_failure(PollingTier::Cold, 11, 10),
            PollingTier::Quarantine
        );
    }

    #[test]
    fn success_releases_quarantine_to_warm_not_hot() {
        assert_eq!(
            tier_after_success(PollingTier::Quarantine),
            PollingTier::Warm
        );
    }

    #[test]
    fn success_leaves_healthy_tiers_alone() {
        for tier in [PollingTier::Hot, PollingTier::Warm, PollingTier::Cold] {
            assert_eq!(tier_after_success(tier), tier);
        }
    }
}
