use async_trait::async_trait;

use crate::{
    error::BackendError,
    task::{
        TaskRef,
        traits::TaskBackend,
    },
};

mod memory;
pub use memory::MemoryPlatform;

pub trait PlatformUrl {
    fn url(&self) -> &str;
}

/// TMPlatform - Task Management Platform
///
/// The seam consumed by the executor and control layers; anything that
/// implements the task backend plus a url identity provides it through
/// the default blanket impl.
#[async_trait]
pub trait TMPlatform: TaskBackend
    + PlatformUrl
    + Send
    + Sync
{
    /// Claim the next queued task, bound to this platform.
    async fn start_task(
        &self,
    ) -> Result<Option<TaskRef<'_, Self>>, BackendError>
    where
        Self: Sized,
    {
        Ok(TaskBackend::start(self)
            .await?
            .map(|task| task.bind(self))
        )
    }

    /// Claim a specific queued task, bound to this platform.
    async fn claim_task(
        &self,
        id: i64,
    ) -> Result<Option<TaskRef<'_, Self>>, BackendError>
    where
        Self: Sized,
    {
        Ok(TaskBackend::claim(self, id)
            .await?
            .map(|task| task.bind(self))
        )
    }

    async fn task(
        &self,
        id: i64,
    ) -> Result<TaskRef<'_, Self>, BackendError>
    where
        Self: Sized,
    {
        Ok(TaskBackend::gets_task(self, id)
            .await?
            .bind(self)
        )
    }
}

pub trait DefaultTMPlatform: TaskBackend + PlatformUrl + Send + Sync {}

impl<P: TaskBackend
    + PlatformUrl
    + DefaultTMPlatform
    + Send
    + Sync
> TMPlatform for P {}
