use jmtcore::{
    cache::TaskCache,
    platform::TMPlatform,
    task::TaskRef,
};
use std::{
    sync::Arc,
    time::Duration,
};

/// Drives tasks from a task management platform through their external
/// process, keeping the shared process registry in step.
pub struct TMPlatformExecutor<P: TMPlatform> {
    pub(crate) platform: Arc<P>,
    pub(crate) cache: Arc<dyn TaskCache>,
    pub(crate) timeout: Option<Duration>,
}

impl<P: TMPlatform> Clone for TMPlatformExecutor<P> {
    fn clone(&self) -> Self {
        Self {
            platform: self.platform.clone(),
            cache: self.cache.clone(),
            timeout: self.timeout,
        }
    }
}

/// One task bound for execution.
pub struct TMPlatformExecutorInstance<'a, P: TMPlatform> {
    pub(crate) task: TaskRef<'a, P>,
    pub(crate) cache: Arc<dyn TaskCache>,
    pub(crate) timeout: Option<Duration>,
}
