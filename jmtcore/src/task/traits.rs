use async_trait::async_trait;
use crate::{
    error::{
        BackendError,
        task::TaskError,
    },
    task::{
        Task,
        Tasks,
    },
};

/// The durable store for task records.
///
/// Transition methods (`run`, `complete`, `fail`, `cancel`) return whether
/// the record was updated; `false` means the task was no longer in a state
/// the transition applies to.  Implementations must guard every transition
/// on the current status so that Completed, Failed and Cancelled are
/// absorbing.
#[async_trait]
pub trait TaskBackend {
    /// Insert a new task record in Pending.
    async fn adds_task(
        &self,
        task: Task,
    ) -> Result<Task, TaskError>;
    async fn gets_task(
        &self,
        id: i64,
    ) -> Result<Task, BackendError>;
    async fn lists_task(
        &self,
    ) -> Result<Tasks, BackendError>;
    /// Claim the oldest Pending task for execution, stamping its start
    /// time.  Returns None when nothing is queued.
    async fn start(
        &self,
    ) -> Result<Option<Task>, BackendError>;
    /// Claim one specific Pending task; None when it is not claimable
    /// (unknown, already claimed, or terminal).
    async fn claim(
        &self,
        id: i64,
    ) -> Result<Option<Task>, BackendError>;
    /// Pending to Running, recording the launched process id.
    async fn run(
        &self,
        id: i64,
        pid: i64,
    ) -> Result<bool, BackendError>;
    /// Running to Completed (exit status 0) or Failed (anything else);
    /// clears the pid and stamps the stop time.
    async fn complete(
        &self,
        id: i64,
        exit_status: i64,
    ) -> Result<bool, BackendError>;
    /// Pending or Running to Failed with a diagnostic message.
    async fn fail(
        &self,
        id: i64,
        msg: &str,
    ) -> Result<bool, BackendError>;
    /// Pending or Running to Cancelled with a diagnostic message.
    async fn cancel(
        &self,
        id: i64,
        msg: &str,
    ) -> Result<bool, BackendError>;
    async fn set_report(
        &self,
        id: i64,
        report_path: &str,
    ) -> Result<bool, BackendError>;
    async fn set_captured(
        &self,
        id: i64,
        stdout: &str,
        stderr: &str,
    ) -> Result<bool, BackendError>;
}
