use jmtcore::task::TaskDetached;
use std::{
    sync::{
        Arc,
        atomic::Ordering,
    },
    time::Duration,
};
use tokio::{
    runtime,
    signal,
    sync::{
        Semaphore,
        broadcast,
        mpsc,
    },
    time,
};
use tokio_stream::{
    StreamExt,
    wrappers::IntervalStream,
};
use tokio_util::task::TaskTracker;

use crate::executor::traits;

use super::*;

impl<EX> Runner<EX>
where
    for<'a> EX: traits::Executor + Send + Sync + Clone + 'a,
    <EX as traits::Executor>::Error: Send + std::fmt::Display + std::fmt::Debug
{
    pub fn new(
        executor: EX,
        rt_handle: runtime::Handle,
        permits: usize,
    ) -> Self {
        let permits = permits.max(1);
        log::info!("setting up runner with {permits} permits");
        let semaphore = Arc::new(Semaphore::new(permits));
        let task_tracker = TaskTracker::new();
        let (sender, receiver) = mpsc::channel(permits);
        let (abort_sender, _) = broadcast::channel(1);
        let termination_token = Arc::new(false.into());
        Self {
            executor,
            rt_handle,
            sender,
            receiver,
            semaphore,
            task_tracker,
            termination_token,
            abort_sender,
        }
    }

    pub fn handle(&self) -> RunnerHandle<EX> {
        RunnerHandle {
            executor: self.executor.clone(),
            sender: self.sender.clone(),
            task_tracker: self.task_tracker.clone(),
            termination_token: self.termination_token.clone(),
            rt_handle: self.rt_handle.clone(),
            abort_sender: self.abort_sender.clone(),
        }
    }

    /// Drain the message queue, spawning an execution per task until a
    /// shutdown message arrives or the termination token is set.
    pub async fn run(&mut self) {
        log::debug!("runner starting up");
        while let Some(msg) = self.receiver.recv().await {
            if self.termination_token.load(Ordering::Relaxed) {
                self.receiver.close();
                self.task_tracker.close();
                log::debug!("termination token set, ignoring receiver queue");
                break;
            }
            match msg {
                RunnerMessage::Task(task) => {
                    log::debug!("runner received: {task}");
                    let semaphore = self.semaphore.clone();
                    let termination_token = self.termination_token.clone();
                    let executor = self.executor.clone();
                    let abort_receiver = self.abort_sender.subscribe();
                    self.rt_handle.spawn(self.task_tracker.track_future(async move {
                        let label = format!("{task}");
                        // acquire only after spawning, so a slow queue
                        // never blocks the shutdown message from being
                        // received
                        let _permit = match Arc::clone(&semaphore).acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => {
                                log::debug!("semaphore closed, dropping task: {label}");
                                return;
                            }
                        };
                        if termination_token.load(Ordering::Relaxed) {
                            log::debug!("runner ignoring task due to termination token: {label}");
                            return;
                        }
                        log::debug!("runner starting task: {label}");
                        match executor.execute(task, abort_receiver).await {
                            Ok(_) => (),
                            Err(e) => log::error!("task executor error: {e}"),
                        }
                        log::debug!("runner finished task: {label}");
                    }));
                },
                RunnerMessage::Shutdown => {
                    self.receiver.close();
                    self.task_tracker.close();
                    log::debug!("runner shutdown message received");
                },
            }
        }
        log::debug!("runner shutting down");
    }
}

impl<EX> RunnerHandle<EX>
where
    for<'a> EX: traits::Executor + Send + Sync + Clone + 'a,
    <EX as traits::Executor>::Error: Send + std::fmt::Display + std::fmt::Debug
{
    /// Hand a task to the underlying runner.
    pub async fn queue_task(&self, task: TaskDetached) {
        match self.sender.send(RunnerMessage::Task(task)).await {
            Ok(()) => (),
            Err(_) => log::debug!("cannot queue task; the runner is no longer listening"),
        }
    }

    pub async fn shutdown(&self) {
        match self.sender.send(RunnerMessage::Shutdown).await {
            Ok(()) => (),
            Err(_) => log::debug!("cannot send shutdown; the runner is no longer listening"),
        }
        log::debug!("waiting for task_tracker...");
        self.task_tracker.wait().await;
        log::debug!("finished waiting for task_tracker");
    }

    /// Signal every in-flight execution to stand down.
    pub fn abort(&self) {
        match self.abort_sender.send(()) {
            Ok(n) => log::debug!("abort signal sent to {n} receiver(s)"),
            Err(_) => log::debug!("abort sent but there are no receivers"),
        }
    }

    /// Stop picking up queued work; in-flight executions continue.
    pub fn terminate(&self) {
        self.termination_token.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Poll the backend for queued tasks and feed them to the runner
    /// until it stops listening.
    pub async fn poll(&self, interval: Duration) {
        let mut ticker = IntervalStream::new(time::interval(interval));
        log::debug!("task poll starting");
        while let Some(_) = (!self.is_closed()).then_some(ticker.next().await).flatten() {
            loop {
                match self.executor.start_task().await {
                    Ok(Some(task)) => {
                        log::debug!("sending task {task}");
                        self.queue_task(task).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // backend trouble; report and try again on the
                        // next tick rather than bringing the poll down
                        log::error!("unable to poll for a new task: {e}");
                        break;
                    }
                }
            }
        }
        log::debug!("task poll stopping");
    }

    pub async fn wait_for_abort_signal(&self) {
        log::trace!("waiting for abort signal");
        match signal::ctrl_c().await {
            Ok(()) => {
                log::debug!("Ctrl-C received for abort");
                self.abort();
            },
            Err(err) => {
                log::debug!("unable to listen for abort signal: {err}");
            },
        }
    }

    pub async fn wait_for_terminate_signal(&self) {
        log::trace!("waiting for termination signal");
        match signal::ctrl_c().await {
            Ok(()) => {
                log::debug!("Ctrl-C received for terminate");
                let handle = self.clone();
                self.rt_handle.spawn(async move {
                    handle.wait_for_abort_signal().await;
                });
                self.terminate();
            },
            Err(err) => {
                log::debug!("unable to listen for termination signal: {err}");
            },
        }
    }

    /// First Ctrl-C drains and shuts down; a second stops picking up
    /// queued work; a third aborts what is still running.
    pub async fn wait_for_shutdown_signal(&self) {
        log::trace!("waiting for shutdown signal");
        match signal::ctrl_c().await {
            Ok(()) => {
                log::debug!("Ctrl-C received for shutdown");
                let handle = self.clone();
                self.rt_handle.spawn(async move {
                    handle.wait_for_terminate_signal().await;
                });
                self.shutdown().await;
                log::debug!("shutdown complete");
            },
            Err(err) => {
                log::debug!("unable to listen for shutdown signal: {err}");
            },
        }
    }
}
