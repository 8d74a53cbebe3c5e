//! Request/reply bridge using ZeroMQ DEALER/ROUTER sockets.
//!
//! Validation requests need an answer while the user is still looking
//! at the form, so they bypass the durable queue entirely:
//! - [`BridgeClient`] wraps a DEALER socket for sending requests
//! - [`BridgeServer`] wraps a ROUTER socket for receiving and replying
//! - [`ReplyToken`] is an opaque handle carrying the ZMQ identity frame
//!
//! Every request gets exactly one reply, matched by `correlation_id`.
//!
//! ## Framing (zeromq-rs 0.4)
//!
//! zeromq-rs ROUTER pushes peer identity as first frame on recv and pops it
//! on send. DEALER sends/receives raw application frames. So:
//! - DEALER sends: `[subject, envelope]`
//! - ROUTER receives: `[identity, subject, envelope]`
//! - ROUTER sends: `[identity, subject, envelope]`
//! - DEALER receives: `[subject, envelope]`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket, ZmqMessage};

use crate::envelope::Envelope;
use crate::error::RohrpostError;
use crate::traits::{RequestHandler, RequestSender};
use crate::transport::Transport;

/// Opaque token carrying the ZMQ routing identity bytes.
///
/// When the ROUTER receives a request, it extracts the peer identity frame.
/// This token must be passed back to [`BridgeServer::send_reply`] so the
/// reply is routed to the correct DEALER client.
#[derive(Debug, Clone)]
pub struct ReplyToken {
    identity: Vec<u8>,
}

type PendingReply = oneshot::Sender<Result<Envelope, RohrpostError>>;

/// Internal command sent from the public API to the background event loop.
struct SendCommand {
    zmq_msg: ZmqMessage,
}

/// ZeroMQ DEALER-socket client for issuing requests and awaiting replies.
///
/// The DEALER socket is owned entirely by a background task that alternates
/// between sending outbound requests (received via an mpsc channel) and
/// receiving inbound replies (dispatched by `correlation_id`). This avoids
/// mutex contention between send and recv paths.
pub struct BridgeClient {
    send_tx: mpsc::Sender<SendCommand>,
    pending: Arc<Mutex<HashMap<Uuid, PendingReply>>>,
    _loop_handle: tokio::task::JoinHandle<()>,
}

impl BridgeClient {
    /// Connect a DEALER socket to a ROUTER endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, RohrpostError> {
        let mut socket = DealerSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting DEALER socket");
        socket.connect(&endpoint).await?;

        let pending: Arc<Mutex<HashMap<Uuid, PendingReply>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (send_tx, send_rx) = mpsc::channel::<SendCommand>(256);

        let loop_pending = Arc::clone(&pending);
        let loop_handle = tokio::spawn(async move {
            Self::event_loop(socket, send_rx, loop_pending).await;
        });

        Ok(Self {
            send_tx,
            pending,
            _loop_handle: loop_handle,
        })
    }

    /// Single-threaded event loop owning the DEALER socket.
    ///
    /// Uses `tokio::select!` to multiplex sends and receives on the same
    /// socket without mutex contention.
    async fn event_loop(
        mut socket: DealerSocket,
        mut send_rx: mpsc::Receiver<SendCommand>,
        pending: Arc<Mutex<HashMap<Uuid, PendingReply>>>,
    ) {
        loop {
            tokio::select! {
                // Outbound: send a request
                Some(cmd) = send_rx.recv() => {
                    if let Err(e) = socket.send(cmd.zmq_msg).await {
                        warn!(error = %e, "DEALER send failed");
                    }
                }
                // Inbound: receive a reply
                result = socket.recv() => {
                    match result {
                        Ok(zmq_msg) => {
                            Self::dispatch_reply(&pending, zmq_msg).await;
                        }
                        Err(e) => {
                            debug!(error = %e, "DEALER recv loop ending");
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    }

    /// Route an inbound reply to the pending caller that requested it.
    async fn dispatch_reply(pending: &Mutex<HashMap<Uuid, PendingReply>>, zmq_msg: ZmqMessage) {
        let frames: Vec<_> = zmq_msg.iter().collect();

        // Skip leading empty delimiter frames (DEALER may receive them
        // depending on the ROUTER's reply framing).
        let data_frames: Vec<_> = frames
            .iter()
            .skip_while(|f| f.as_ref().is_empty())
            .collect();

        if data_frames.len() < 2 {
            warn!(
                raw_frame_count = frames.len(),
                data_frame_count = data_frames.len(),
                "unexpected frame count on DEALER recv"
            );
            return;
        }

        let envelope_bytes = data_frames[1].as_ref();
        let envelope = match Envelope::from_bytes(envelope_bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "failed to decode reply envelope");
                return;
            }
        };

        let cid = envelope.correlation_id;
        let mut map = pending.lock().await;

        if let Some(tx) = map.remove(&cid) {
            let _ = tx.send(Ok(envelope));
        } else {
            debug!(correlation_id = %cid, "received reply for unknown correlation_id");
        }
    }

    /// Serialize the envelope and enqueue it for the background event loop.
    async fn enqueue_send(&self, envelope: &Envelope) -> Result<(), RohrpostError> {
        let envelope_bytes = envelope.to_bytes()?;
        let mut zmq_msg = ZmqMessage::from(envelope.subject.as_str());
        zmq_msg.push_back(envelope_bytes.into());

        self.send_tx
            .send(SendCommand { zmq_msg })
            .await
            .map_err(|_| RohrpostError::Transport("client event loop closed".into()))?;
        Ok(())
    }
}

#[async_trait]
impl RequestSender for BridgeClient {
    /// Send a request and wait for a single reply matched by `correlation_id`.
    ///
    /// Returns `RohrpostError::Timeout` if no reply arrives within `timeout`.
    async fn request(
        &self,
        envelope: Envelope,
        timeout_dur: Duration,
    ) -> Result<Envelope, RohrpostError> {
        let cid = envelope.correlation_id;
        let (tx, rx) = oneshot::channel();

        {
            let mut map = self.pending.lock().await;
            map.insert(cid, tx);
        }

        self.enqueue_send(&envelope).await?;
        debug!(correlation_id = %cid, subject = %envelope.subject, "sent request");

        match tokio::time::timeout(timeout_dur, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&cid);
                Err(RohrpostError::Transport(
                    "reply channel closed unexpectedly".into(),
                ))
            }
            Err(_) => {
                self.pending.lock().await.remove(&cid);
                Err(RohrpostError::Timeout(timeout_dur))
            }
        }
    }
}

/// ZeroMQ ROUTER-socket server for receiving requests and sending replies.
///
/// Binds a ROUTER socket. Each received message includes the peer identity,
/// which is wrapped in a [`ReplyToken`] for routing the reply back.
pub struct BridgeServer {
    socket: Mutex<RouterSocket>,
}

impl BridgeServer {
    /// Bind a ROUTER socket on the given transport endpoint.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, RohrpostError> {
        transport
            .ensure_ipc_dir()
            .map_err(|e| RohrpostError::Transport(e.to_string()))?;
        transport
            .remove_stale_socket()
            .map_err(|e| RohrpostError::Transport(e.to_string()))?;
        let mut socket = RouterSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding ROUTER socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl RequestHandler for BridgeServer {
    /// Receive the next request from any connected DEALER client.
    ///
    /// Returns a [`ReplyToken`] (holding the peer identity) and the
    /// decoded [`Envelope`].
    async fn recv_request(&self) -> Result<(ReplyToken, Envelope), RohrpostError> {
        let mut socket = self.socket.lock().await;
        let zmq_msg = socket.recv().await?;

        // ROUTER recv frames: [identity, ...data_frames]
        // The identity is prepended by zeromq-rs. Remaining frames are
        // whatever the DEALER sent: [subject, envelope].
        let frames: Vec<_> = zmq_msg.iter().collect();

        if frames.len() < 2 {
            return Err(RohrpostError::Transport(format!(
                "expected at least 2 frames from ROUTER, got {}",
                frames.len()
            )));
        }

        let identity = frames[0].as_ref().to_vec();

        // Skip identity and any empty delimiter frames to find [subject, envelope].
        let data_frames: Vec<_> = frames[1..]
            .iter()
            .skip_while(|f| f.as_ref().is_empty())
            .collect();

        if data_frames.len() < 2 {
            return Err(RohrpostError::Transport(format!(
                "expected [subject, envelope] after identity, got {} data frames",
                data_frames.len()
            )));
        }

        let envelope_bytes = data_frames[1].as_ref();
        let envelope = Envelope::from_bytes(envelope_bytes)?;

        debug!(
            correlation_id = %envelope.correlation_id,
            subject = %envelope.subject,
            "received request"
        );

        Ok((ReplyToken { identity }, envelope))
    }

    /// Send a reply to the client identified by the [`ReplyToken`].
    ///
    /// Frames sent: `[identity, subject, envelope]`
    /// ROUTER pops identity and routes the remaining frames to the peer.
    async fn send_reply(&self, token: ReplyToken, reply: Envelope) -> Result<(), RohrpostError> {
        let envelope_bytes = reply.to_bytes()?;

        let mut zmq_msg = ZmqMessage::from(token.identity);
        zmq_msg.push_back(reply.subject.as_bytes().to_vec().into());
        zmq_msg.push_back(envelope_bytes.into());

        let mut socket = self.socket.lock().await;
        socket.send(zmq_msg).await?;

        debug!(
            correlation_id = %reply.correlation_id,
            subject = %reply.subject,
            "sent reply"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_token_clone() {
        let token = ReplyToken {
            identity: vec![1, 2, 3],
        };
        let cloned = token.clone();
        assert_eq!(token.identity, cloned.identity);
    }
}
