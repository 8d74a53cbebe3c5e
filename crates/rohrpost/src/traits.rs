use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::bridge::ReplyToken;
use crate::envelope::Envelope;
use crate::error::RohrpostError;

/// Publishes envelopes onto the durable stream their subject maps to.
///
/// Publishing is the only write path into the queue; consumers pull
/// from streams directly. Implementations must reject subjects that no
/// catalog stream accepts.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Publish an envelope for immediate delivery.
    async fn publish(&self, envelope: &Envelope) -> Result<(), RohrpostError>;

    /// Publish an envelope that becomes deliverable at `deliver_at`.
    async fn publish_delayed(
        &self,
        envelope: &Envelope,
        deliver_at: DateTime<Utc>,
    ) -> Result<(), RohrpostError>;
}

/// Blanket implementation so `Arc<dyn QueuePublisher>` can be used directly.
#[async_trait]
impl<T: QueuePublisher + ?Sized> QueuePublisher for Arc<T> {
    async fn publish(&self, envelope: &Envelope) -> Result<(), RohrpostError> {
        (**self).publish(envelope).await
    }

    async fn publish_delayed(
        &self,
        envelope: &Envelope,
        deliver_at: DateTime<Utc>,
    ) -> Result<(), RohrpostError> {
        (**self).publish_delayed(envelope, deliver_at).await
    }
}

/// Sends a request over the bridge and awaits the matching reply.
#[async_trait]
pub trait RequestSender: Send + Sync {
    /// Send a request and wait for a single reply matched by
    /// `correlation_id`. Times out with `RohrpostError::Timeout`.
    async fn request(&self, envelope: Envelope, timeout: Duration)
        -> Result<Envelope, RohrpostError>;
}

/// Server side of the request/reply bridge.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Receive the next request. Blocks until one is available.
    async fn recv_request(&self) -> Result<(ReplyToken, Envelope), RohrpostError>;

    /// Send a reply to the peer identified by the token.
    async fn send_reply(&self, token: ReplyToken, reply: Envelope) -> Result<(), RohrpostError>;
}
