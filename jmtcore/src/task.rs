use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};

/// One execution attempt of an uploaded test plan.
///
/// The record is created in `Pending` before any process is launched;
/// every mutation after that goes through the `TaskBackend` transition
/// methods so that the terminal states stay absorbing.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Task {
    pub id: i64,
    pub status: i64,
    pub bin_path: String,
    pub plan_path: String,
    pub plan_hash: Option<String>,
    pub output_path: Option<String>,
    pub report_path: Option<String>,
    pub basedir: String,
    pub pid: Option<i64>,
    pub created_ts: i64,
    pub start_ts: Option<i64>,
    pub stop_ts: Option<i64>,
    pub exit_status: Option<i64>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub error_msg: Option<String>,
    pub args: Option<TaskArgs>,
}

#[derive(Clone, Copy, Debug, PartialEq, FromPrimitive, IntoPrimitive)]
#[repr(i64)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    #[num_enum(default)]
    Unknown = -1,
}

impl TaskStatus {
    /// Completed, Failed and Cancelled absorb; no transition leaves
    /// them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TaskArg {
    pub id: i64,
    pub task_id: i64,
    pub arg: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TaskArgs(Vec<TaskArg>);

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Tasks(Vec<Task>);

mod detached;
mod impls;
mod refs;
pub mod traits;

pub use detached::TaskDetached;
pub use refs::TaskRef;

/// Captured output stored on a task is truncated to this many bytes per
/// stream; the full streams remain on disk under the task basedir.
pub const CAPTURE_LIMIT: usize = 64 * 1024;
