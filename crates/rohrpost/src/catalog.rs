//! Stream catalog: which subjects flow into which stream, and how long
//! messages survive there.
//!
//! Publishing resolves the stream from the envelope's subject, so a
//! subject missing from the catalog is a publish-time error rather
//! than a silently dropped message.

use std::time::Duration;

use crate::messages::subjects;

/// How a stream retains its messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Messages live until a consumer acknowledges them.
    WorkQueue,
    /// Messages expire `max_age` after publication, consumed or not.
    BoundedTime { max_age: Duration },
}

/// Static description of one stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamSpec {
    /// Stream name, also the value of the `stream` column in storage.
    pub name: &'static str,
    /// Subjects routed into this stream.
    pub subjects: &'static [&'static str],
    pub retention: Retention,
}

pub mod streams {
    use super::*;

    /// New raw posts waiting for pipeline processing.
    pub const INGEST: StreamSpec = StreamSpec {
        name: "ingest",
        subjects: &[subjects::RAW_POST_CREATED],
        retention: Retention::WorkQueue,
    };

    /// Feed announcements waiting for bootstrap.
    pub const FEEDS: StreamSpec = StreamSpec {
        name: "feeds",
        subjects: &[subjects::FEED_CREATED],
        retention: Retention::WorkQueue,
    };

    /// Notification fan-out; stale notifications are worthless.
    pub const NOTIFY: StreamSpec = StreamSpec {
        name: "notify",
        subjects: &[subjects::POST_CREATED, subjects::FEED_INITIAL_SYNC],
        retention: Retention::BoundedTime {
            max_age: Duration::from_secs(24 * 60 * 60),
        },
    };

    /// Digest triggers; max_age exceeds the longest digest interval
    /// (168 hours) so a delayed trigger never expires before it fires.
    pub const DIGESTS: StreamSpec = StreamSpec {
        name: "digests",
        subjects: &[subjects::DIGEST_PENDING, subjects::DIGEST_EXECUTE],
        retention: Retention::BoundedTime {
            max_age: Duration::from_secs(192 * 60 * 60),
        },
    };

    /// Worker heartbeats; only the recent past is interesting.
    pub const WORKERS: StreamSpec = StreamSpec {
        name: "workers",
        subjects: &[subjects::WORKER_HEALTH],
        retention: Retention::BoundedTime {
            max_age: Duration::from_secs(10 * 60),
        },
    };

    /// Every stream, in catalog order.
    pub const ALL: &[StreamSpec] = &[INGEST, FEEDS, NOTIFY, DIGESTS, WORKERS];
}

/// Resolve the stream a subject is routed into.
pub fn stream_for_subject(subject: &str) -> Option<&'static StreamSpec> {
    streams::ALL.iter().find(|s| s.subjects.contains(&subject))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subject_resolves_to_exactly_one_stream() {
        for stream in streams::ALL {
            for subject in stream.subjects {
                let owners: Vec<_> = streams::ALL
                    .iter()
                    .filter(|s| s.subjects.contains(subject))
                    .collect();
                assert_eq!(owners.len(), 1, "subject {subject} owned by {owners:?}");
                assert_eq!(stream_for_subject(subject).unwrap().name, stream.name);
            }
        }
    }

    #[test]
    fn bridge_subjects_are_not_queued() {
        assert!(stream_for_subject(subjects::SOURCE_VALIDATE).is_none());
        assert!(stream_for_subject(subjects::SOURCE_VALIDATE_REPLY).is_none());
        assert!(stream_for_subject("depesche.unknown.subject").is_none());
    }

    #[test]
    fn digest_retention_outlives_longest_interval() {
        let Retention::BoundedTime { max_age } = streams::DIGESTS.retention else {
            panic!("digests stream must be time-bounded");
        };
        assert!(max_age > Duration::from_secs(168 * 60 * 60));
    }

    #[test]
    fn work_queues_have_no_expiry() {
        assert_eq!(streams::INGEST.retention, Retention::WorkQueue);
        assert_eq!(streams::FEEDS.retention, Retention::WorkQueue);
    }
}
