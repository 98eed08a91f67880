use async_trait::async_trait;
use jmtcore::task::TaskDetached;
use tokio::sync::broadcast;

#[async_trait]
pub trait Executor {
    type Error;

    /// Claim the next queued task, detached so it can cross into the
    /// runner's runtime.
    async fn start_task(
        &self,
    ) -> Result<Option<TaskDetached>, Self::Error>;
    /// Run the task to a terminal state; the abort receiver fires when
    /// the runner is being torn down and stands down the process.
    async fn execute(
        &self,
        task: TaskDetached,
        abort_receiver: broadcast::Receiver<()>,
    ) -> Result<(i64, bool), Self::Error>;
}
