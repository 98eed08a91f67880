use std::path::Path;
use crate::{
    error::BackendError,
    platform::TMPlatform,
    task::{
        Task,
        TaskStatus,
        traits::TaskBackend,
    },
};

pub struct TaskRef<'a, P: TMPlatform + Sized> {
    pub(super) inner: Task,
    pub(super) platform: &'a P,
}

impl Task {
    pub fn bind<'a, P: TMPlatform + Sized>(
        self,
        platform: &'a P,
    ) -> TaskRef<'a, P> {
        TaskRef {
            inner: self,
            platform,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status.into()
    }

    /// Seconds between start and stop, when both are stamped.
    pub fn elapsed(&self) -> Option<i64> {
        Some(self.stop_ts? - self.start_ts?)
    }

    /// The registry lookup key for this task, derived from the output
    /// file name.
    pub fn cache_key(&self) -> Option<&str> {
        Path::new(self.output_path.as_deref()?)
            .file_name()?
            .to_str()
    }
}

impl<P: TMPlatform + Sized> TaskRef<'_, P> {
    pub async fn run(
        &mut self,
        pid: i64,
    ) -> Result<bool, BackendError> {
        let result = TaskBackend::run(
            self.platform,
            self.inner.id,
            pid,
        ).await?;
        if result {
            self.inner.status = TaskStatus::Running.into();
            self.inner.pid = Some(pid);
        }
        Ok(result)
    }

    pub async fn complete(
        &mut self,
        exit_status: i64,
    ) -> Result<bool, BackendError> {
        let result = TaskBackend::complete(
            self.platform,
            self.inner.id,
            exit_status,
        ).await?;
        if result {
            self.inner.status = if exit_status == 0 {
                TaskStatus::Completed.into()
            } else {
                TaskStatus::Failed.into()
            };
            self.inner.pid = None;
            self.inner.exit_status = Some(exit_status);
        }
        Ok(result)
    }

    pub async fn fail(
        &mut self,
        msg: &str,
    ) -> Result<bool, BackendError> {
        let result = TaskBackend::fail(
            self.platform,
            self.inner.id,
            msg,
        ).await?;
        if result {
            self.inner.status = TaskStatus::Failed.into();
            self.inner.pid = None;
            self.inner.error_msg = Some(msg.to_string());
        }
        Ok(result)
    }

    pub async fn cancel(
        &mut self,
        msg: &str,
    ) -> Result<bool, BackendError> {
        let result = TaskBackend::cancel(
            self.platform,
            self.inner.id,
            msg,
        ).await?;
        if result {
            self.inner.status = TaskStatus::Cancelled.into();
            self.inner.pid = None;
            self.inner.error_msg = Some(msg.to_string());
        }
        Ok(result)
    }

    pub async fn set_captured(
        &mut self,
        stdout: &str,
        stderr: &str,
    ) -> Result<bool, BackendError> {
        let result = TaskBackend::set_captured(
            self.platform,
            self.inner.id,
            stdout,
            stderr,
        ).await?;
        if result {
            self.inner.stdout = Some(stdout.to_string());
            self.inner.stderr = Some(stderr.to_string());
        }
        Ok(result)
    }

    pub fn id(&self) -> i64 {
        self.inner.id
    }

    pub fn basedir(&self) -> &str {
        self.inner.basedir.as_ref()
    }

    pub fn cache_key(&self) -> Option<&str> {
        self.inner.cache_key()
    }

    pub fn pid(&self) -> Option<i64> {
        self.inner.pid
    }

    pub fn exit_status(&self) -> Option<i64> {
        self.inner.exit_status
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.status()
    }

    pub fn into_inner(self) -> Task {
        self.inner
    }
}
