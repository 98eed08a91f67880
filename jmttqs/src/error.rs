use jmtcore::error::{
    BackendError,
    ValueError,
    task::TaskError,
};
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Value(#[from] ValueError),
    /// The process could not be started at all; kept apart from every
    /// exit-status outcome.
    #[error("unable to launch process: {0}")]
    Launch(std::io::Error),
    #[error(transparent)]
    Stdio(#[from] std::io::Error),
    #[error("process {pid} terminated after exceeding the {timeout} second limit")]
    Timeout { pid: i64, timeout: u64 },
    #[cfg(unix)]
    #[error("unable to signal process group {pid}: {errno}")]
    Signal { pid: i64, errno: nix::errno::Errno },
    #[cfg(not(unix))]
    #[error("process group signalling is not supported on this platform")]
    SignalUnsupported,
}
