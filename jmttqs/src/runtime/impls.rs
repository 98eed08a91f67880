use std::time::Duration;
use tokio::runtime;

use crate::{
    executor::traits,
    runner::Runner,
};

use super::*;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl<EX> Default for Builder<EX>
where
    for<'a> EX: traits::Executor + Send + Sync + Clone + 'a,
    <EX as traits::Executor>::Error: Send + std::fmt::Display + std::fmt::Debug
{
    fn default() -> Self {
        Self::new()
    }
}

impl<EX> From<EX> for Builder<EX>
where
    for<'a> EX: traits::Executor + Send + Sync + Clone + 'a,
    <EX as traits::Executor>::Error: Send + std::fmt::Display + std::fmt::Debug
{
    fn from(value: EX) -> Self {
        Self::new()
            .executor(value)
    }
}

impl<EX> Builder<EX>
where
    for<'a> EX: traits::Executor + Send + Sync + Clone + 'a,
    <EX as traits::Executor>::Error: Send + std::fmt::Display + std::fmt::Debug
{
    pub fn new() -> Self {
        Self {
            executor: None,
            permits: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn executor(mut self, value: EX) -> Self {
        self.executor = Some(value);
        self
    }

    pub fn permits(mut self, value: usize) -> Self {
        self.permits = value;
        self
    }

    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = value;
        self
    }

    pub fn build(self) -> Runtime<EX> {
        Runtime::new(
            self.executor
                .expect("Executor was not provided with Builder"),
            self.permits,
            self.poll_interval,
        )
    }

    pub fn build_with_handle(
        self,
        handle: runtime::Handle,
    ) -> Runtime<EX> {
        Runtime::with_handle(
            handle,
            self.executor
                .expect("Executor was not provided with Builder"),
            self.permits,
            self.poll_interval,
        )
    }
}

impl<EX> Runtime<EX>
where
    for<'a> EX: traits::Executor + Send + Sync + Clone + 'a,
    <EX as traits::Executor>::Error: Send + std::fmt::Display + std::fmt::Debug
{
    pub fn new(
        executor: EX,
        permits: usize,
        poll_interval: Duration,
    ) -> Self {
        let runtime = runtime::Builder::new_multi_thread()
            .enable_io()
            .enable_time()
            .build()
            .expect("unable to create the runner runtime");
        let handle = runtime.handle().clone();
        Self {
            runtime: Some(runtime),
            handle,
            executor,
            permits,
            poll_interval,
            driver: None,
        }
    }

    pub fn with_handle(
        handle: runtime::Handle,
        executor: EX,
        permits: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            runtime: None,
            handle,
            executor,
            permits,
            poll_interval,
            driver: None,
        }
    }

    /// Wire up the runner and its polling loop; calling it again is a
    /// no-op.
    pub fn start(&mut self) {
        if self.driver.is_some() {
            return;
        }

        let mut runner: Runner<EX> = Runner::new(
            self.executor.clone(),
            self.handle.clone(),
            self.permits,
        );
        let driver = runner.handle();
        self.driver = Some(driver.clone());
        let poll_interval = self.poll_interval;
        self.handle.spawn(async move {
            driver.poll(poll_interval).await
        });
        self.handle.spawn(async move {
            runner.run().await
        });
    }

    pub fn handle(&self) -> Option<&crate::runner::RunnerHandle<EX>> {
        self.driver.as_ref()
    }

    /// Block until the staged Ctrl-C shutdown completes.  Does nothing
    /// if the runtime was never started.
    pub fn wait(&mut self) {
        if let Some(driver) = &self.driver {
            match &self.runtime {
                Some(runtime) => runtime.block_on(async {
                    driver.wait_for_shutdown_signal().await;
                }),
                None => self.handle.block_on(async {
                    driver.wait_for_shutdown_signal().await;
                }),
            }
        }
    }
}
