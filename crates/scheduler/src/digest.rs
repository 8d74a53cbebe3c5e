//! Digest trigger scheduling.
//!
//! A digest job re-arms itself: after every execution the next trigger
//! is published as a delayed `digest.pending` message. The delayed
//! publish is the only durable record of the next run, so it retries
//! before giving up.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use depesche_rohrpost::events::DigestSchedule;
use depesche_rohrpost::{subjects, Envelope, QueuePublisher, RohrpostError};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Shortest digest cadence, in hours.
pub const MIN_INTERVAL_HOURS: u32 = 1;
/// Longest digest cadence, in hours. One week.
pub const MAX_INTERVAL_HOURS: u32 = 168;

const MAX_PUBLISH_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("digest interval {0}h out of range ({MIN_INTERVAL_HOURS}h to {MAX_INTERVAL_HOURS}h)")]
    IntervalOutOfRange(u32),

    #[error(transparent)]
    Publish(#[from] RohrpostError),
}

/// Arms the next trigger for a digest job.
pub struct DigestScheduler {
    publisher: Arc<dyn QueuePublisher>,
    retry_delay: Duration,
}

impl DigestScheduler {
    pub fn new(publisher: Arc<dyn QueuePublisher>) -> Self {
        Self {
            publisher,
            retry_delay: RETRY_DELAY,
        }
    }

    /// Overrides the delay between publish retries.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Publishes the next `digest.pending` trigger for `job_id`,
    /// delayed by `interval_hours` from now.
    ///
    /// The trigger time is computed once up front; retries re-publish
    /// the same envelope for the same instant, so a slow broker never
    /// drifts the cadence. Returns the scheduled time on success.
    pub async fn schedule_next(
        &self,
        job_id: Uuid,
        interval_hours: u32,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        if !(MIN_INTERVAL_HOURS..=MAX_INTERVAL_HOURS).contains(&interval_hours) {
            return Err(ScheduleError::IntervalOutOfRange(interval_hours));
        }

        let scheduled_at = Utc::now() + chrono::Duration::hours(i64::from(interval_hours));
        let trigger = DigestSchedule {
            job_id,
            scheduled_at,
            interval_hours,
        };
        let envelope = Envelope::new(subjects::DIGEST_PENDING, &trigger)?;

        let mut delay = self.retry_delay;
        let mut last_error = RohrpostError::Transport("no publish attempt made".to_string());

        for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
            match self.publisher.publish_delayed(&envelope, scheduled_at).await {
                Ok(()) => {
                    debug!(%job_id, %scheduled_at, "digest trigger armed");
                    return Ok(scheduled_at);
                }
                Err(e) => {
                    warn!(%job_id, attempt, error = %e, "digest trigger publish failed");
                    last_error = e;
                    if attempt < MAX_PUBLISH_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        error!(%job_id, "giving up arming digest trigger");
        Err(ScheduleError::Publish(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FlakyPublisher {
        failures_left: Mutex<u32>,
        attempts: Mutex<u32>,
        published: Mutex<Vec<(Envelope, DateTime<Utc>)>>,
    }

    impl FlakyPublisher {
        fn failing(times: u32) -> Arc<Self> {
            Arc::new(Self {
                failures_left: Mutex::new(times),
                attempts: Mutex::new(0),
                published: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> u32 {
            *self.attempts.lock().unwrap()
        }

        fn published(&self) -> Vec<(Envelope, DateTime<Utc>)> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueuePublisher for FlakyPublisher {
        async fn publish(&self, envelope: &Envelope) -> Result<(), RohrpostError> {
            self.publish_delayed(envelope, Utc::now()).await
        }

        async fn publish_delayed(
            &self,
            envelope: &Envelope,
            deliver_at: DateTime<Utc>,
        ) -> Result<(), RohrpostError> {
            *self.attempts.lock().unwrap() += 1;
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(RohrpostError::Transport("broker unavailable".to_string()));
                }
            }
            self.published
                .lock()
                .unwrap()
                .push((envelope.clone(), deliver_at));
            Ok(())
        }
    }

    fn scheduler(publisher: Arc<FlakyPublisher>) -> DigestScheduler {
        DigestScheduler::new(publisher).retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn rejects_out_of_range_intervals() {
        let publisher = FlakyPublisher::failing(0);
        let scheduler = scheduler(publisher.clone());

        for hours in [0, MAX_INTERVAL_HOURS + 1] {
            let err = scheduler
                .schedule_next(Uuid::new_v4(), hours)
                .await
                .unwrap_err();
            assert!(matches!(err, ScheduleError::IntervalOutOfRange(h) if h == hours));
        }
        assert_eq!(publisher.attempts(), 0);
    }

    #[tokio::test]
    async fn arms_a_delayed_trigger_on_the_pending_subject() {
        let publisher = FlakyPublisher::failing(0);
        let scheduler = scheduler(publisher.clone());
        let job_id = Uuid::new_v4();

        let before = Utc::now();
        let at = scheduler.schedule_next(job_id, 24).await.unwrap();

        assert!(at >= before + chrono::Duration::hours(24));

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        let (envelope, deliver_at) = &published[0];
        assert_eq!(envelope.subject, subjects::DIGEST_PENDING);
        assert_eq!(*deliver_at, at);

        let trigger: DigestSchedule = envelope.decode().unwrap();
        assert_eq!(trigger.job_id, job_id);
        assert_eq!(trigger.interval_hours, 24);
        assert_eq!(trigger.scheduled_at, at);
    }

    #[tokio::test]
    async fn retries_transient_publish_failures() {
        let publisher = FlakyPublisher::failing(2);
        let scheduler = scheduler(publisher.clone());

        let at = scheduler.schedule_next(Uuid::new_v4(), 1).await.unwrap();

        assert_eq!(publisher.attempts(), 3);
        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1, at);
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let publisher = FlakyPublisher::failing(5);
        let scheduler = scheduler(publisher.clone());

        let err = scheduler
            .schedule_next(Uuid::new_v4(), 12)
            .await
            .unwrap_err();

        assert!(matches!(err, ScheduleError::Publish(_)));
        assert_eq!(publisher.attempts(), 3);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn boundary_intervals_are_accepted() {
        let publisher = FlakyPublisher::failing(0);
        let scheduler = scheduler(publisher.clone());

        scheduler
            .schedule_next(Uuid::new_v4(), MIN_INTERVAL_HOURS)
            .await
            .unwrap();
        scheduler
            .schedule_next(Uuid::new_v4(), MAX_INTERVAL_HOURS)
            .await
            .unwrap();

        assert_eq!(publisher.published().len(), 2);
    }
}
