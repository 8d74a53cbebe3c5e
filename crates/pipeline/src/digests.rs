//! Digest trigger consumption.
//!
//! Digests cycle through two subjects on the same stream. A delayed
//! `digest.pending` trigger surfaces when its run time arrives and is
//! forwarded as an immediate `digest.execute` order; executing runs the
//! digest and re-arms the next pending trigger. The chain of correlation
//! ids ties each execution back to the trigger that caused it.

use depesche_rohrpost::events::DigestSchedule;
use depesche_rohrpost::{subjects, Envelope, QueuePublisher};
use depesche_scheduler::{DigestScheduler, ScheduleError};
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::processor::DigestRunner;

/// Process one delivery from the digest stream.
pub async fn handle_digest_envelope(
    envelope: &Envelope,
    publisher: &dyn QueuePublisher,
    runner: &dyn DigestRunner,
    scheduler: &DigestScheduler,
) -> Result<(), PipelineError> {
    match envelope.subject.as_str() {
        subjects::DIGEST_PENDING => forward_due_trigger(envelope, publisher).await,
        subjects::DIGEST_EXECUTE => execute_and_rearm(envelope, runner, scheduler).await,
        other => {
            warn!(subject = other, "unexpected subject on digest stream");
            Ok(())
        }
    }
}

/// A pending trigger came due: forward it as an execution order under
/// the same correlation id. Publish failures propagate so the trigger
/// is redelivered rather than lost.
async fn forward_due_trigger(
    envelope: &Envelope,
    publisher: &dyn QueuePublisher,
) -> Result<(), PipelineError> {
    let trigger: DigestSchedule = match envelope.decode() {
        Ok(trigger) => trigger,
        Err(err) => {
            error!(%err, "dropping undecodable digest trigger");
            return Ok(());
        }
    };

    let order =
        Envelope::with_correlation(subjects::DIGEST_EXECUTE, &trigger, envelope.correlation_id)?;
    publisher.publish(&order).await?;

    info!(job_id = %trigger.job_id, scheduled_at = %trigger.scheduled_at, "digest due, execution ordered");
    Ok(())
}

/// Run the digest, then arm the next trigger.
///
/// Runner failures propagate before any re-arm, so a redelivery retries
/// the execution without doubling the schedule. An out-of-range interval
/// can never become valid, so that job is dropped with an error instead
/// of looping through redelivery forever.
async fn execute_and_rearm(
    envelope: &Envelope,
    runner: &dyn DigestRunner,
    scheduler: &DigestScheduler,
) -> Result<(), PipelineError> {
    let trigger: DigestSchedule = match envelope.decode() {
        Ok(trigger) => trigger,
        Err(err) => {
            error!(%err, "dropping undecodable digest execution order");
            return Ok(());
        }
    };

    runner.run(trigger.job_id).await?;

    match scheduler.schedule_next(trigger.job_id, trigger.interval_hours).await {
        Ok(next_at) => {
            info!(job_id = %trigger.job_id, %next_at, "digest executed, next trigger armed");
            Ok(())
        }
        Err(ScheduleError::IntervalOutOfRange(hours)) => {
            error!(job_id = %trigger.job_id, hours, "digest job has an invalid interval, not re-arming");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use depesche_rohrpost::RohrpostError;
    use uuid::Uuid;

    use crate::error::ProcessorError;

    use super::*;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<Envelope>>,
        delayed: Mutex<Vec<(Envelope, DateTime<Utc>)>>,
    }

    impl RecordingPublisher {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn published(&self) -> Vec<Envelope> {
            self.published.lock().unwrap().clone()
        }

        fn delayed(&self) -> Vec<(Envelope, DateTime<Utc>)> {
            self.delayed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueuePublisher for RecordingPublisher {
        async fn publish(&self, envelope: &Envelope) -> Result<(), RohrpostError> {
            self.published.lock().unwrap().push(envelope.clone());
            Ok(())
        }

        async fn publish_delayed(
            &self,
            envelope: &Envelope,
            deliver_at: DateTime<Utc>,
        ) -> Result<(), RohrpostError> {
            self.delayed
                .lock()
                .unwrap()
                .push((envelope.clone(), deliver_at));
            Ok(())
        }
    }

    struct RecordingRunner {
        runs: Mutex<Vec<Uuid>>,
        fail: bool,
    }

    impl RecordingRunner {
        fn new() -> Self {
            Self {
                runs: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                runs: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn runs(&self) -> Vec<Uuid> {
            self.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DigestRunner for RecordingRunner {
        async fn run(&self, job_id: Uuid) -> Result<(), ProcessorError> {
            self.runs.lock().unwrap().push(job_id);
            if self.fail {
                return Err(ProcessorError::new("renderer offline"));
            }
            Ok(())
        }
    }

    fn trigger(interval_hours: u32) -> DigestSchedule {
        DigestSchedule {
            job_id: Uuid::new_v4(),
            scheduled_at: Utc::now(),
            interval_hours,
        }
    }

    #[tokio::test]
    async fn due_trigger_is_forwarded_under_the_same_correlation_id() {
        let publisher = RecordingPublisher::new();
        let runner = RecordingRunner::new();
        let scheduler = DigestScheduler::new(publisher.clone());

        let trigger = trigger(24);
        let pending = Envelope::new(subjects::DIGEST_PENDING, &trigger).unwrap();

        handle_digest_envelope(&pending, publisher.as_ref(), &runner, &scheduler)
            .await
            .unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].subject, subjects::DIGEST_EXECUTE);
        assert_eq!(published[0].correlation_id, pending.correlation_id);
        let forwarded: DigestSchedule = published[0].decode().unwrap();
        assert_eq!(forwarded, trigger);

        // Forwarding only; nothing ran, nothing re-armed.
        assert!(runner.runs().is_empty());
        assert!(publisher.delayed().is_empty());
    }

    #[tokio::test]
    async fn execution_runs_the_digest_and_arms_the_next_trigger() {
        let publisher = RecordingPublisher::new();
        let runner = RecordingRunner::new();
        let scheduler = DigestScheduler::new(publisher.clone());

        let trigger = trigger(24);
        let order = Envelope::new(subjects::DIGEST_EXECUTE, &trigger).unwrap();

        handle_digest_envelope(&order, publisher.as_ref(), &runner, &scheduler)
            .await
            .unwrap();

        assert_eq!(runner.runs(), vec![trigger.job_id]);

        let delayed = publisher.delayed();
        assert_eq!(delayed.len(), 1);
        assert_eq!(delayed[0].0.subject, subjects::DIGEST_PENDING);
        let next: DigestSchedule = delayed[0].0.decode().unwrap();
        assert_eq!(next.job_id, trigger.job_id);
        assert_eq!(next.interval_hours, 24);
        assert!(next.scheduled_at > trigger.scheduled_at);
    }

    #[tokio::test]
    async fn failed_execution_propagates_without_rearming() {
        let publisher = RecordingPublisher::new();
        let runner = RecordingRunner::failing();
        let scheduler = DigestScheduler::new(publisher.clone());

        let order = Envelope::new(subjects::DIGEST_EXECUTE, &trigger(24)).unwrap();

        let result = handle_digest_envelope(&order, publisher.as_ref(), &runner, &scheduler).await;

        assert!(matches!(result, Err(PipelineError::Processor(_))));
        assert!(publisher.delayed().is_empty());
    }

    #[tokio::test]
    async fn invalid_interval_is_dropped_instead_of_retried() {
        let publisher = RecordingPublisher::new();
        let runner = RecordingRunner::new();
        let scheduler = DigestScheduler::new(publisher.clone());

        let order = Envelope::new(subjects::DIGEST_EXECUTE, &trigger(0)).unwrap();

        // The run happens, the re-arm fails permanently, the delivery
        // still completes so the queue stops redelivering it.
        handle_digest_envelope(&order, publisher.as_ref(), &runner, &scheduler)
            .await
            .unwrap();

        assert_eq!(runner.runs().len(), 1);
        assert!(publisher.delayed().is_empty());
    }

    #[tokio::test]
    async fn unexpected_subjects_are_ignored() {
        let publisher = RecordingPublisher::new();
        let runner = RecordingRunner::new();
        let scheduler = DigestScheduler::new(publisher.clone());

        let stray = Envelope::new(subjects::POST_CREATED, &trigger(24)).unwrap();

        handle_digest_envelope(&stray, publisher.as_ref(), &runner, &scheduler)
            .await
            .unwrap();

        assert!(runner.runs().is_empty());
        assert!(publisher.published().is_empty());
        assert!(publisher.delayed().is_empty());
    }
}
