pub mod error;
pub mod fetch;
pub mod poller;
pub mod validator;

pub use error::IngestError;
pub use fetch::{DefaultFetcher, FetchOutcome, FetchedItem, SourceFetcher};
pub use poller::Poller;
pub use validator::{request_validation, run_validation_responder, SourceValidator};
