use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::{
    chrono::Utc,
    error::{
        BackendError,
        task::TaskError,
    },
    platform::{
        DefaultTMPlatform,
        PlatformUrl,
    },
    task::{
        Task,
        TaskArg,
        TaskStatus,
        Tasks,
        traits::TaskBackend,
    },
};

/// The reference in-memory task store.
///
/// State lives behind a single mutex; every backend call is one short
/// critical section, never held across an await.
pub struct MemoryPlatform {
    url: String,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    tasks: BTreeMap<i64, Task>,
}

impl MemoryPlatform {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new("memory:tasks")
    }
}

impl PlatformUrl for MemoryPlatform {
    fn url(&self) -> &str {
        self.url.as_ref()
    }
}

impl DefaultTMPlatform for MemoryPlatform {}

#[async_trait]
impl TaskBackend for MemoryPlatform {
    async fn adds_task(
        &self,
        mut task: Task,
    ) -> Result<Task, TaskError> {
        if task.id > 0 {
            return Err(TaskError::TaskAlreadyQueued(task.id));
        }
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        let args = task.args.take();
        let result = Task {
            id,
            status: TaskStatus::Pending.into(),
            created_ts: Utc::now().timestamp(),
            args: args.map(|args| args
                .iter()
                .enumerate()
                .map(|(i, arg)| TaskArg {
                    id: i as i64 + 1,
                    task_id: id,
                    arg: arg.arg.clone(),
                })
                .collect::<Vec<_>>()
                .into()),
            .. task
        };
        state.tasks.insert(id, result.clone());
        Ok(result)
    }

    async fn gets_task(
        &self,
        id: i64,
    ) -> Result<Task, BackendError> {
        self.state.lock()
            .tasks
            .get(&id)
            .cloned()
            .ok_or(BackendError::AppInvariantViolation(
                format!("no task with id {id}")
            ))
    }

    async fn lists_task(
        &self,
    ) -> Result<Tasks, BackendError> {
        Ok(self.state.lock()
            .tasks
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .into()
        )
    }

    async fn start(
        &self,
    ) -> Result<Option<Task>, BackendError> {
        let mut state = self.state.lock();
        let result = state.tasks
            .values_mut()
            .find(|task| {
                task.status() == TaskStatus::Pending && task.start_ts.is_none()
            });
        Ok(result.map(|task| {
            task.start_ts = Some(Utc::now().timestamp());
            task.clone()
        }))
    }

    async fn claim(
        &self,
        id: i64,
    ) -> Result<Option<Task>, BackendError> {
        let mut state = self.state.lock();
        let result = state.tasks
            .get_mut(&id)
            .filter(|task| {
                task.status() == TaskStatus::Pending && task.start_ts.is_none()
            });
        Ok(result.map(|task| {
            task.start_ts = Some(Utc::now().timestamp());
            task.clone()
        }))
    }

    async fn run(
        &self,
        id: i64,
        pid: i64,
    ) -> Result<bool, BackendError> {
        let mut state = self.state.lock();
        Ok(match state.tasks.get_mut(&id) {
            Some(task) if task.status() == TaskStatus::Pending => {
                task.status = TaskStatus::Running.into();
                task.pid = Some(pid);
                true
            }
            _ => false,
        })
    }

    async fn complete(
        &self,
        id: i64,
        exit_status: i64,
    ) -> Result<bool, BackendError> {
        let mut state = self.state.lock();
        Ok(match state.tasks.get_mut(&id) {
            Some(task) if task.status() == TaskStatus::Running => {
                task.status = if exit_status == 0 {
                    TaskStatus::Completed.into()
                } else {
                    TaskStatus::Failed.into()
                };
                task.pid = None;
                task.stop_ts = Some(Utc::now().timestamp());
                task.exit_status = Some(exit_status);
                true
            }
            _ => false,
        })
    }

    async fn fail(
        &self,
        id: i64,
        msg: &str,
    ) -> Result<bool, BackendError> {
        let mut state = self.state.lock();
        Ok(match state.tasks.get_mut(&id) {
            Some(task) if matches!(
                task.status(),
                TaskStatus::Pending | TaskStatus::Running,
            ) => {
                task.status = TaskStatus::Failed.into();
                task.pid = None;
                task.stop_ts = Some(Utc::now().timestamp());
                task.error_msg = Some(msg.to_string());
                true
            }
            _ => false,
        })
    }

    async fn cancel(
        &self,
        id: i64,
        msg: &str,
    ) -> Result<bool, BackendError> {
        let mut state = self.state.lock();
        Ok(match state.tasks.get_mut(&id) {
            Some(task) if matches!(
                task.status(),
                TaskStatus::Pending | TaskStatus::Running,
            ) => {
                task.status = TaskStatus::Cancelled.into();
                task.pid = None;
                task.stop_ts = Some(Utc::now().timestamp());
                task.error_msg = Some(msg.to_string());
                true
            }
            _ => false,
        })
    }

    async fn set_report(
        &self,
        id: i64,
        report_path: &str,
    ) -> Result<bool, BackendError> {
        let mut state = self.state.lock();
        Ok(match state.tasks.get_mut(&id) {
            Some(task) if task.status() == TaskStatus::Completed => {
                task.report_path = Some(report_path.to_string());
                true
            }
            _ => false,
        })
    }

    async fn set_captured(
        &self,
        id: i64,
        stdout: &str,
        stderr: &str,
    ) -> Result<bool, BackendError> {
        let mut state = self.state.lock();
        Ok(match state.tasks.get_mut(&id) {
            Some(task) => {
                task.stdout = Some(stdout.to_string());
                task.stderr = Some(stderr.to_string());
                true
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        platform::TMPlatform,
        task::{
            Task,
            TaskStatus,
            traits::TaskBackend,
        },
    };
    use super::MemoryPlatform;

    fn demo_task() -> Task {
        Task {
            bin_path: "/opt/apache-jmeter-5.5/bin/jmeter".into(),
            plan_path: "plans/smoke.jmx".into(),
            basedir: "/tmp".into(),
            args: Some(["-n", "-t", "plans/smoke.jmx"].iter()
                .map(|a| a.to_string())
                .collect()),
            .. Default::default()
        }
    }

    #[async_std::test]
    async fn lifecycle_to_completed() -> anyhow::Result<()> {
        let platform = MemoryPlatform::default();
        let task = platform.adds_task(demo_task()).await?;
        assert_eq!(task.id, 1);
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.created_ts, 1234567890);
        assert_eq!(task.args.as_ref().map(|args| args.len()), Some(3));

        let mut task_ref = platform.start_task()
            .await?
            .expect("task queued");
        assert!(task_ref.run(321).await?);
        assert_eq!(task_ref.pid(), Some(321));
        assert!(task_ref.complete(0).await?);

        let task = platform.gets_task(1).await?;
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.pid, None);
        assert_eq!(task.exit_status, Some(0));

        // nothing else queued
        assert!(platform.start_task().await?.is_none());
        Ok(())
    }

    #[async_std::test]
    async fn terminal_states_absorb() -> anyhow::Result<()> {
        let platform = MemoryPlatform::default();
        let task = platform.adds_task(demo_task()).await?;
        let id = task.id;
        platform.start().await?;
        assert!(platform.run(id, 99).await?);
        assert!(platform.complete(id, 1).await?);
        assert_eq!(platform.gets_task(id).await?.status(), TaskStatus::Failed);

        assert!(!platform.run(id, 100).await?);
        assert!(!platform.complete(id, 0).await?);
        assert!(!platform.fail(id, "again").await?);
        assert!(!platform.cancel(id, "again").await?);
        assert_eq!(platform.gets_task(id).await?.status(), TaskStatus::Failed);
        Ok(())
    }

    #[async_std::test]
    async fn cancel_before_launch() -> anyhow::Result<()> {
        let platform = MemoryPlatform::default();
        let task = platform.adds_task(demo_task()).await?;
        assert!(platform.cancel(task.id, "stopped before launch").await?);
        let task = platform.gets_task(task.id).await?;
        assert_eq!(task.status(), TaskStatus::Cancelled);
        assert_eq!(task.error_msg.as_deref(), Some("stopped before launch"));

        // a cancelled task is no longer claimable
        assert!(platform.start_task().await?.is_none());
        Ok(())
    }

    #[async_std::test]
    async fn report_only_after_completed() -> anyhow::Result<()> {
        let platform = MemoryPlatform::default();
        let task = platform.adds_task(demo_task()).await?;
        let id = task.id;
        assert!(!platform.set_report(id, "reports/smoke").await?);
        platform.run(id, 7).await?;
        platform.complete(id, 0).await?;
        assert!(platform.set_report(id, "reports/smoke").await?);
        assert_eq!(
            platform.gets_task(id).await?.report_path.as_deref(),
            Some("reports/smoke"),
        );
        Ok(())
    }

    #[async_std::test]
    async fn queued_task_is_rejected() {
        let platform = MemoryPlatform::default();
        let task = Task { id: 1, .. demo_task() };
        assert!(platform.adds_task(task).await.is_err());
    }
}
