use jmtcore::task::TaskDetached;
use std::sync::{
    Arc,
    atomic::AtomicBool,
};
use tokio::{
    runtime,
    sync::{
        Semaphore,
        broadcast,
        mpsc,
    },
};
use tokio_util::task::TaskTracker;

use crate::executor::traits;

pub enum RunnerMessage {
    Task(TaskDetached),
    Shutdown,
}

/// Consumes queued tasks and runs each through the executor on its own
/// spawned future, bounded by the semaphore permits.
pub struct Runner<EX: traits::Executor> {
    pub(super) executor: EX,
    pub(super) rt_handle: runtime::Handle,
    pub(super) sender: mpsc::Sender<RunnerMessage>,
    pub(super) receiver: mpsc::Receiver<RunnerMessage>,
    pub(super) semaphore: Arc<Semaphore>,
    pub(super) task_tracker: TaskTracker,
    pub(super) termination_token: Arc<AtomicBool>,
    pub(super) abort_sender: broadcast::Sender<()>,
}

/// Cloneable front to a `Runner`; queues tasks, polls the backend for
/// new ones, and drives the staged shutdown.
pub struct RunnerHandle<EX: traits::Executor> {
    pub(super) executor: EX,
    pub(super) sender: mpsc::Sender<RunnerMessage>,
    pub(super) task_tracker: TaskTracker,
    pub(super) termination_token: Arc<AtomicBool>,
    pub(super) rt_handle: runtime::Handle,
    pub(super) abort_sender: broadcast::Sender<()>,
}

impl<EX: traits::Executor + Clone> Clone for RunnerHandle<EX> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            sender: self.sender.clone(),
            task_tracker: self.task_tracker.clone(),
            termination_token: self.termination_token.clone(),
            rt_handle: self.rt_handle.clone(),
            abort_sender: self.abort_sender.clone(),
        }
    }
}
