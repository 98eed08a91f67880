use async_trait::async_trait;
use jmtcore::{
    cache::{
        CacheEntry,
        TaskCache,
    },
    error::ValueError,
    platform::TMPlatform,
    task::{
        TaskDetached,
        TaskRef,
    },
};
use std::{
    fs::File,
    path::{
        Path,
        PathBuf,
    },
    process::Stdio,
    sync::Arc,
    time::Duration,
};
use tokio::{
    process::Command,
    sync::broadcast,
};

use crate::{
    error::RunnerError,
    process::{
        ProcessHandle,
        read_capped,
        terminate_group,
    },
};
use super::*;

impl<'a, P: TMPlatform> TMPlatformExecutorInstance<'a, P> {
    fn new(
        task: TaskRef<'a, P>,
        cache: Arc<dyn TaskCache>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            task,
            cache,
            timeout,
        }
    }

    pub fn task(&self) -> &TaskRef<'a, P> {
        &self.task
    }

    pub async fn execute(
        &mut self,
        abort_receiver: broadcast::Receiver<()>,
    ) -> Result<(i64, bool), RunnerError> {
        let id = self.task.id();
        let mut command: Command = (&self.task).try_into()
            .map_err(ValueError::from)?;
        let key = self.task.cache_key()
            .ok_or(ValueError::UninitializedAttribute("task missing output path"))?
            .to_string();
        let basedir = PathBuf::from(self.task.basedir());
        if basedir.as_os_str().is_empty() {
            return Err(ValueError::UninitializedAttribute("task missing basedir").into());
        }
        log::trace!("task id {id} will run: {command:?}");

        let work_path = basedir.join("work");
        let temp_path = basedir.join("temp");
        std::fs::create_dir_all(&work_path)?;
        std::fs::create_dir_all(&temp_path)?;
        let stdout_file = File::create(temp_path.join("stdout"))?;
        let stderr_file = File::create(temp_path.join("stderr"))?;
        command
            .current_dir(&work_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file));

        let handle = match ProcessHandle::spawn(&mut command) {
            Ok(handle) => handle,
            Err(e) => {
                // failed in place; no pid ever reaches the registry
                self.task.fail(&e.to_string()).await?;
                return Err(e);
            }
        };
        let pid = handle.pid();
        // the registry entry must be in place before the first await of
        // the exit status, so a stop issued right after the execute
        // request cannot miss a live process
        self.cache.set(&key, CacheEntry { task_id: id, pid }, None);
        self.task.run(pid).await?;
        log::trace!("waiting for child {pid}");

        let mut wait_fut = Box::pin(handle.wait(self.timeout));
        let waited = tokio::select! {
            outcome = &mut wait_fut => Some(outcome),
            _ = wait_abort(abort_receiver) => None,
        };
        // whichever way the wait went, this run's registration goes
        self.cache.remove(&key);

        match waited {
            Some(Ok(outcome)) => {
                self.record_output(&temp_path).await?;
                let code = outcome.exit_status;
                self.task.complete(code).await?;
                log::trace!(
                    "child {pid} exit with code {code} after {:.2}s",
                    outcome.elapsed.as_secs_f64(),
                );
                Ok((code, code == 0))
            }
            Some(Err(e @ RunnerError::Timeout { .. })) => {
                // record whatever output made it out before the kill
                self.record_output(&temp_path).await?;
                self.task.fail(&e.to_string()).await?;
                Err(e)
            }
            Some(Err(e)) => {
                self.task.fail(&e.to_string()).await?;
                Err(e)
            }
            None => {
                log::debug!("task {id} aborted while child {pid} was running");
                if let Err(e) = terminate_group(pid) {
                    log::warn!("group termination for aborted task {id} failed: {e}");
                }
                // reap the leader; a process that shrugs off the signal
                // is left to the runtime's orphan handling
                let reap = tokio::time::timeout(
                    Duration::from_secs(5),
                    &mut wait_fut,
                ).await;
                if reap.is_err() {
                    log::warn!("aborted task {id} child {pid} did not exit when signalled");
                }
                self.task.cancel("aborted by runner shutdown").await?;
                Ok((-1, false))
            }
        }
    }

    async fn record_output(
        &mut self,
        temp_path: &Path,
    ) -> Result<(), RunnerError> {
        let stdout = read_capped(&temp_path.join("stdout"))?;
        let stderr = read_capped(&temp_path.join("stderr"))?;
        self.task.set_captured(&stdout, &stderr).await?;
        Ok(())
    }
}

/// Resolves when an abort is signalled; a closed channel means no abort
/// can ever arrive, so it pends instead.
async fn wait_abort(mut abort_receiver: broadcast::Receiver<()>) {
    use broadcast::error::RecvError;
    match abort_receiver.recv().await {
        Ok(()) | Err(RecvError::Lagged(_)) => (),
        Err(RecvError::Closed) => std::future::pending().await,
    }
}

impl<P: TMPlatform> TMPlatformExecutor<P> {
    pub fn new(
        platform: Arc<P>,
        cache: Arc<dyn TaskCache>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            platform,
            cache,
            timeout,
        }
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    pub fn cache(&self) -> &Arc<dyn TaskCache> {
        &self.cache
    }

    pub fn instance<'a>(
        &self,
        task: TaskRef<'a, P>,
    ) -> TMPlatformExecutorInstance<'a, P> {
        TMPlatformExecutorInstance::new(
            task,
            self.cache.clone(),
            self.timeout,
        )
    }
}

#[async_trait]
impl<P: TMPlatform + 'static> traits::Executor for TMPlatformExecutor<P> {
    type Error = RunnerError;

    async fn start_task(
        &self,
    ) -> Result<Option<TaskDetached>, Self::Error> {
        Ok(self.platform.start_task().await?
            .map(|task| task.detach())
        )
    }

    async fn execute(
        &self,
        task: TaskDetached,
        abort_receiver: broadcast::Receiver<()>,
    ) -> Result<(i64, bool), Self::Error> {
        let task = task.bind(self.platform.as_ref())?;
        let mut instance = self.instance(task);
        instance.execute(abort_receiver).await
    }
}
