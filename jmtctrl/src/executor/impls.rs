use async_trait::async_trait;
use jmtcore::{
    platform::TMPlatform,
    task::TaskDetached,
};
use jmttqs::executor::traits;
use tokio::sync::broadcast;

use crate::{
    error::PlatformError,
    platform::Platform,
};

use super::Executor;

impl<TMP: TMPlatform + 'static> Executor<TMP> {
    pub fn new(platform: Platform<TMP>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl<TMP: TMPlatform + 'static> traits::Executor for Executor<TMP> {
    type Error = PlatformError;

    async fn start_task(
        &self,
    ) -> Result<Option<TaskDetached>, Self::Error> {
        Ok(self.platform
            .tm_platform
            .start_task()
            .await
            .map(|task| task.map(|task| task.detach()))?
        )
    }

    async fn execute(
        &self,
        task: TaskDetached,
        abort_receiver: broadcast::Receiver<()>,
    ) -> Result<(i64, bool), Self::Error> {
        let id = task.id();
        let (code, success) = traits::Executor::execute(
            &self.platform.executor(),
            task,
            abort_receiver,
        ).await?;
        if success && self.platform.settings().auto_report {
            match self.platform.generate_report(id).await {
                Ok(outcome) if !outcome.success => log::warn!(
                    "report generation for task {id} failed: {}",
                    outcome.message,
                ),
                Ok(_) => (),
                Err(e) => log::warn!(
                    "report generation for task {id} errored: {e}",
                ),
            }
        }
        Ok((code, success))
    }
}
