use depesche_rohrpost::RohrpostError;
use depesche_scheduler::ScheduleError;
use depesche_store::StoreError;
use thiserror::Error;

/// Failure inside a post processor.
///
/// Processors are domain plugins; a string keeps their error surface
/// flat so the consumer loop can log it and return the delivery.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProcessorError(pub String);

impl ProcessorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] RohrpostError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}
