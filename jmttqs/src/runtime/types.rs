use std::time::Duration;
use tokio::runtime::Handle;

use crate::{
    executor::traits,
    runner::RunnerHandle,
};

pub struct Builder<EX: traits::Executor> {
    pub(super) executor: Option<EX>,
    pub(super) permits: usize,
    pub(super) poll_interval: Duration,
}

/// Owns (or borrows) the tokio runtime that a runner lives on, together
/// with the polling loop that feeds it.
pub struct Runtime<EX: traits::Executor> {
    pub(super) runtime: Option<tokio::runtime::Runtime>,
    pub(super) handle: Handle,
    pub(super) executor: EX,
    pub(super) permits: usize,
    pub(super) poll_interval: Duration,
    pub(super) driver: Option<RunnerHandle<EX>>,
}
