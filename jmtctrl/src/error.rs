use jmtcore::error::{
    BackendError,
    ValueError,
    task::TaskError,
};
use jmttqs::error::RunnerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error(transparent)]
    BackendError(#[from] BackendError),
    #[error(transparent)]
    RunnerError(#[from] RunnerError),
    #[error(transparent)]
    StdioError(#[from] std::io::Error),
    #[error(transparent)]
    TaskError(#[from] TaskError),
    #[error(transparent)]
    ValueError(#[from] ValueError),
    /// Malformed request input; surfaced to the caller, never recorded
    /// on any task.
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
}
