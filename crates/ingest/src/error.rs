use depesche_rohrpost::RohrpostError;
use depesche_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] RohrpostError),

    #[error("failed to parse feed document: {0}")]
    Parse(String),
}
