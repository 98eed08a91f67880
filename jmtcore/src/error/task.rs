use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task has already been queued with id: {0}")]
    TaskAlreadyQueued(i64),
    #[error("task {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    BackendError(#[from] crate::error::BackendError),
}
