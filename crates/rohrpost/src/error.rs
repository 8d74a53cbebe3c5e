use thiserror::Error;

/// Errors that can occur in the rohrpost messaging layer.
#[derive(Debug, Error)]
pub enum RohrpostError {
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("envelope encode error: {0}")]
    EnvelopeEncode(#[from] rmp_serde::encode::Error),

    #[error("envelope decode error: {0}")]
    EnvelopeDecode(#[from] rmp_serde::decode::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("no stream accepts subject '{0}'")]
    UnknownSubject(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
