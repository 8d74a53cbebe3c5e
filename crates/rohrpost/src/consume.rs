//! Pull-based consumer loop for durable streams.
//!
//! Wraps the claim/ack/nack cycle around a per-delivery handler:
//! - handler returns `Ok` → the delivery is acked (done)
//! - handler returns `Err` → logged and nacked for redelivery
//! - pull errors back off exponentially, capped at thirty seconds
//!
//! Handlers see deliveries at least once; anything they do must
//! tolerate a redelivered envelope.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use depesche_core::config::QueueConfig;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::catalog::StreamSpec;
use crate::queue::{Delivery, DurableQueue};

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Consume one stream until `shutdown` is notified.
pub async fn run_consume_loop<F, Fut, E>(
    queue: DurableQueue,
    stream: &'static StreamSpec,
    config: QueueConfig,
    shutdown: Arc<Notify>,
    handler: F,
) where
    F: Fn(Delivery) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let visibility = Duration::from_secs(config.visibility_secs);
    let idle = Duration::from_millis(config.idle_sleep_ms);
    let mut consecutive_errors: u32 = 0;

    info!(stream = stream.name, "consumer running");

    loop {
        let batch = tokio::select! {
            result = queue.pull(stream, config.pull_batch, visibility) => result,
            _ = shutdown.notified() => {
                info!(stream = stream.name, "consumer stopping");
                return;
            }
        };

        let deliveries = match batch {
            Ok(deliveries) => {
                consecutive_errors = 0;
                deliveries
            }
            Err(error) => {
                consecutive_errors += 1;
                let backoff = backoff_delay(consecutive_errors);
                warn!(
                    stream = stream.name,
                    %error,
                    attempt = consecutive_errors,
                    backoff_ms = backoff.as_millis() as u64,
                    "pull failed, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => continue,
                    _ = shutdown.notified() => return,
                }
            }
        };

        if deliveries.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(idle) => continue,
                _ = shutdown.notified() => return,
            }
        }

        for delivery in deliveries {
            let id = delivery.id;
            let subject = delivery.envelope.subject.clone();
            let attempt = delivery.attempt;

            match handler(delivery).await {
                Ok(()) => {
                    if let Err(error) = queue.ack(id).await {
                        warn!(stream = stream.name, message_id = id, %error, "ack failed");
                    }
                }
                Err(error) => {
                    warn!(
                        stream = stream.name,
                        message_id = id,
                        subject = %subject,
                        attempt,
                        %error,
                        "handler failed, returning delivery"
                    );
                    if let Err(error) = queue.nack(id).await {
                        warn!(stream = stream.name, message_id = id, %error, "nack failed");
                    }
                }
            }
        }
    }
}

fn backoff_delay(consecutive_errors: u32) -> Duration {
    let factor = 2u32.saturating_pow(consecutive_errors.saturating_sub(1).min(16));
    BACKOFF_BASE.saturating_mul(factor).min(BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_secs(1));
        assert_eq!(backoff_delay(3), Duration::from_secs(2));
        assert_eq!(backoff_delay(7), BACKOFF_CAP);
        assert_eq!(backoff_delay(u32::MAX), BACKOFF_CAP);
    }
}
