//! End-to-end source validation over a loopback bridge.
//!
//! Uses channel-shaped requests only, so no outbound HTTP is needed.

use std::sync::Arc;
use std::time::Duration;

use depesche_core::{SourceType, ValidationType};
use depesche_ingest::{request_validation, run_validation_responder, SourceValidator};
use depesche_rohrpost::events::{SourceValidateReply, SourceValidateRequest};
use depesche_rohrpost::{subjects, BridgeClient, BridgeServer, Envelope, RequestSender, Transport};
use tokio::sync::Notify;

/// Time for sockets to finish connecting.
const SETTLE: Duration = Duration::from_millis(200);
const TIMEOUT: Duration = Duration::from_secs(5);

fn loopback(port: u16) -> Transport {
    Transport::Tcp {
        host: "127.0.0.1".to_string(),
        port,
    }
}

#[tokio::test]
async fn validation_round_trip_over_the_bridge() {
    let transport = loopback(17530);
    let server = Arc::new(BridgeServer::bind(&transport).await.unwrap());
    let validator = Arc::new(SourceValidator::new().unwrap());
    let shutdown = Arc::new(Notify::new());

    let responder = tokio::spawn(run_validation_responder(
        server,
        validator,
        shutdown.clone(),
    ));

    tokio::time::sleep(SETTLE).await;
    let client = BridgeClient::connect(&transport).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    // Explicit channel validation normalizes the preview URL.
    let reply = request_validation(
        &client,
        &SourceValidateRequest {
            url: "https://t.me/s/some_channel".to_string(),
            validation_type: ValidationType::Channel,
        },
        TIMEOUT,
    )
    .await
    .unwrap();
    assert!(reply.valid);
    assert_eq!(reply.detected_type, Some(SourceType::Channel));
    assert_eq!(
        reply.normalized_url.as_deref(),
        Some("https://t.me/some_channel")
    );

    // Auto detection settles on channel for a t.me URL without fetching.
    let reply = request_validation(
        &client,
        &SourceValidateRequest {
            url: "https://t.me/other_channel".to_string(),
            validation_type: ValidationType::Auto,
        },
        TIMEOUT,
    )
    .await
    .unwrap();
    assert!(reply.valid);
    assert_eq!(reply.detected_type, Some(SourceType::Channel));

    // A malformed payload still gets an answer, not a hang.
    let bogus = Envelope::new(subjects::SOURCE_VALIDATE, &serde_json::json!({"nope": true}))
        .unwrap();
    let raw = client.request(bogus, TIMEOUT).await.unwrap();
    let reply: SourceValidateReply = raw.decode().unwrap();
    assert!(!reply.valid);
    assert!(reply.message.contains("malformed"));

    shutdown.notify_waiters();
    responder.await.unwrap();
}
