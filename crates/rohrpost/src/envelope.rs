use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RohrpostError;

/// Unit of communication for both the durable queue and the
/// request/reply bridge.
///
/// The `subject` routes the envelope to a stream (see
/// [`crate::catalog`]), while `correlation_id` ties replies and
/// follow-up envelopes back to the interaction that caused them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Subject this envelope is addressed to (e.g. "depesche.post.created").
    pub subject: String,

    /// Structured payload, produced from the typed event structs.
    pub payload: serde_json::Value,

    /// When this envelope was created.
    pub published_at: DateTime<Utc>,

    /// Correlation ID for request-response tracking and tracing.
    pub correlation_id: Uuid,

    /// Schema version for forward-compatible evolution.
    #[serde(default = "default_version")]
    pub version: u16,
}

/// Default version for envelopes that omit the field (backward compat).
fn default_version() -> u16 {
    1
}

impl Envelope {
    /// Create a new envelope with a fresh correlation id.
    pub fn new<T: Serialize>(subject: impl Into<String>, payload: &T) -> Result<Self, RohrpostError> {
        Ok(Self {
            subject: subject.into(),
            payload: serde_json::to_value(payload)?,
            published_at: Utc::now(),
            correlation_id: Uuid::new_v4(),
            version: 1,
        })
    }

    /// Create an envelope with an explicit correlation ID (for replies
    /// and continuations of an existing interaction).
    pub fn with_correlation<T: Serialize>(
        subject: impl Into<String>,
        payload: &T,
        correlation_id: Uuid,
    ) -> Result<Self, RohrpostError> {
        Ok(Self {
            subject: subject.into(),
            payload: serde_json::to_value(payload)?,
            published_at: Utc::now(),
            correlation_id,
            version: 1,
        })
    }

    /// Deserialize the payload into the expected event type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, RohrpostError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Serialize the whole envelope to MessagePack for the bridge wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RohrpostError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RohrpostError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_payload() {
        let payload = "hello world".to_string();
        let env = Envelope::new("test.subject", &payload).unwrap();

        assert_eq!(env.subject, "test.subject");
        assert_eq!(env.decode::<String>().unwrap(), "hello world");
    }

    #[test]
    fn roundtrip_envelope_bytes() {
        let env = Envelope::new("test.numbers", &42u64).unwrap();
        let bytes = env.to_bytes().unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.subject, "test.numbers");
        assert_eq!(decoded.correlation_id, env.correlation_id);
        assert_eq!(decoded.decode::<u64>().unwrap(), 42);
    }

    #[test]
    fn with_correlation_preserves_id() {
        let id = Uuid::new_v4();
        let env = Envelope::with_correlation("test.reply", &true, id).unwrap();
        assert_eq!(env.correlation_id, id);
    }

    #[test]
    fn decode_rejects_mismatched_payload() {
        let env = Envelope::new("test.subject", &"not a number").unwrap();
        assert!(env.decode::<u64>().is_err());
    }
}
