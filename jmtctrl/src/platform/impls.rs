use jmtcore::{
    cache::{
        CacheEntry,
        TaskCache,
    },
    platform::TMPlatform,
    task::{
        Task,
        TaskStatus,
        Tasks,
        traits::TaskBackend,
    },
};
use jmttqs::{
    executor::TMPlatformExecutor,
    process::terminate_group,
};
use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::sync::broadcast;

use crate::{
    error::PlatformError,
    report::{
        self,
        ReportOutcome,
    },
    settings::Settings,
    validate,
};

use super::*;

// how long a background launch is given to become observable before the
// spawn call returns with whatever state the record reached
const SPAWN_SETTLE_LIMIT: Duration = Duration::from_secs(5);

impl<TMP: TMPlatform + 'static> Platform<TMP> {
    pub fn new(
        tm_platform: Arc<TMP>,
        cache: Arc<dyn TaskCache>,
        settings: Settings,
    ) -> Self {
        Self {
            tm_platform,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn executor(&self) -> TMPlatformExecutor<TMP> {
        TMPlatformExecutor::new(
            self.tm_platform.clone(),
            self.cache.clone(),
            self.settings.exec_timeout(),
        )
    }

    /// Validate the plan reference and queue a Pending record carrying
    /// the full argument vector for the eventual launch.
    ///
    /// Request-level trouble (bad name, missing file) surfaces here and
    /// no record is created for it.
    pub async fn prepare_plan(
        &self,
        file_name: &str,
    ) -> Result<Task, PlatformError> {
        validate::validate_plan_name(file_name)?;
        let plan_path = self.settings.plan_root.join(file_name);
        if !plan_path.is_file() {
            return Err(PlatformError::NotFound(
                format!("test plan not found: {file_name}")
            ));
        }
        // everything handed to the external process is absolute; the
        // child runs from its own scratch directory
        let plan_path = std::fs::canonicalize(&plan_path)?;
        std::fs::create_dir_all(&self.settings.log_root)?;
        let log_root = std::fs::canonicalize(&self.settings.log_root)?;
        let plan_hash = validate::file_sha256(&plan_path)?;

        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PlatformError::Validation(
                format!("unusable plan name: {file_name}")
            ))?;
        let run_name = format!(
            "{stem}_{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
        );
        let output_path = log_root.join(format!("{run_name}.jtl"));
        let jmeter_log = log_root.join(format!("{run_name}.log"));
        let basedir = log_root.join(&run_name);

        let args: Vec<String> = vec![
            "-n".into(),
            "-t".into(),
            plan_path.to_string_lossy().into_owned(),
            "-l".into(),
            output_path.to_string_lossy().into_owned(),
            "-j".into(),
            jmeter_log.to_string_lossy().into_owned(),
            "-Jjmeter.save.saveservice.output_format=xml".into(),
            "-Jjmeter.save.saveservice.response_data.on_error=true".into(),
        ];
        let task = Task {
            bin_path: self.settings.jmeter_bin().to_string_lossy().into_owned(),
            plan_path: plan_path.to_string_lossy().into_owned(),
            plan_hash: Some(plan_hash),
            output_path: Some(output_path.to_string_lossy().into_owned()),
            basedir: basedir.to_string_lossy().into_owned(),
            args: Some(args.into_iter().collect()),
            .. Default::default()
        };
        log::info!("queueing test plan {file_name} as run {run_name}");
        Ok(self.tm_platform.adds_task(task).await?)
    }

    /// Queue only; a polling runner claims and executes the record.
    pub async fn queue_plan(
        &self,
        file_name: &str,
    ) -> Result<Task, PlatformError> {
        self.prepare_plan(file_name).await
    }

    /// The blocking convention: run the plan to a terminal state and
    /// return the final record.  Failures of the run itself live on the
    /// record, not in the error channel.
    pub async fn execute_plan(
        &self,
        file_name: &str,
    ) -> Result<Task, PlatformError> {
        let task = self.prepare_plan(file_name).await?;
        let id = task.id;
        match self.tm_platform.claim_task(id).await? {
            Some(task_ref) => {
                let (_abort_tx, abort_rx) = broadcast::channel(1);
                let executor = self.executor();
                let mut instance = executor.instance(task_ref);
                if let Err(e) = instance.execute(abort_rx).await {
                    log::debug!("execution of task {id} ended with error: {e}");
                }
            }
            None => log::debug!("task {id} was claimed elsewhere before the blocking run"),
        }
        Ok(self.tm_platform.gets_task(id).await?)
    }

    /// The fire-and-forget convention: launch in the background, but do
    /// not return before the pid registration (or a terminal state) is
    /// observable, so a stop issued straight after cannot miss the
    /// process.
    pub async fn spawn_plan(
        &self,
        file_name: &str,
    ) -> Result<Task, PlatformError> {
        let task = self.prepare_plan(file_name).await?;
        let id = task.id;
        let Some(claimed) = self.tm_platform.claim_task(id).await? else {
            return Ok(self.tm_platform.gets_task(id).await?);
        };
        let detached = claimed.detach();
        let executor = self.executor();
        let (abort_tx, abort_rx) = broadcast::channel(1);
        tokio::spawn(async move {
            // the sender rides along so the abort channel stays open
            let _abort_tx = abort_tx;
            let result = jmttqs::executor::Executor::execute(
                &executor,
                detached,
                abort_rx,
            ).await;
            if let Err(e) = result {
                log::warn!("background execution of task {id} ended with error: {e}");
            }
        });

        if let Some(key) = task.cache_key().map(str::to_string) {
            let settle = tokio::time::timeout(SPAWN_SETTLE_LIMIT, async {
                loop {
                    if self.cache.get(&key).is_some() {
                        break Ok::<_, PlatformError>(());
                    }
                    if self.tm_platform.gets_task(id).await?.status().is_terminal() {
                        break Ok(());
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }).await;
            match settle {
                Ok(result) => result?,
                Err(_) => log::warn!("task {id} launch not observable after {SPAWN_SETTLE_LIMIT:?}"),
            }
        }
        Ok(self.tm_platform.gets_task(id).await?)
    }

    pub async fn task(
        &self,
        id: i64,
    ) -> Result<Task, PlatformError> {
        Ok(self.tm_platform.gets_task(id).await?)
    }

    pub async fn list_tasks(&self) -> Result<Tasks, PlatformError> {
        Ok(self.tm_platform.lists_task().await?)
    }

    /// Snapshot of the live process registry.
    pub fn cache_entries(&self) -> Vec<(String, CacheEntry)> {
        self.cache.get_all()
    }

    /// Resolve the key, signal the process group, drop the registry
    /// entry and close out the record.  Never errors: every outcome is
    /// data for the caller.
    pub async fn stop_by_key(&self, key: &str) -> StopOutcome {
        let Some(entry) = self.cache.get(key) else {
            return StopOutcome {
                key: key.to_string(),
                pid: None,
                status: StopStatus::NotFound,
                message: format!("no entry for {key} in the registry"),
            };
        };
        log::info!("stopping {key} (task {}, pid {})", entry.task_id, entry.pid);
        let signalled = terminate_group(entry.pid);
        // the entry goes regardless of whether the signal landed
        self.cache.remove(key);
        match signalled {
            Ok(()) => {
                match self.tm_platform.cancel(entry.task_id, "stopped by request").await {
                    Ok(true) => (),
                    Ok(false) => log::debug!(
                        "task {} already terminal at stop", entry.task_id,
                    ),
                    Err(e) => log::warn!(
                        "unable to close out stopped task {}: {e}", entry.task_id,
                    ),
                }
                StopOutcome {
                    key: key.to_string(),
                    pid: Some(entry.pid),
                    status: StopStatus::Stopped,
                    message: "process group terminated".to_string(),
                }
            }
            Err(e) => StopOutcome {
                key: key.to_string(),
                pid: Some(entry.pid),
                status: StopStatus::SignalFailed,
                message: e.to_string(),
            },
        }
    }

    /// Stop everything registered right now; best effort, one outcome
    /// per key.  A key that vanished since the snapshot reports
    /// NotFound, which is the desired end state anyway.
    pub async fn stop_all(&self) -> Vec<StopOutcome> {
        let keys = self.cache.get_all_keys();
        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            outcomes.push(self.stop_by_key(&key).await);
        }
        outcomes
    }

    /// Stop a task by its durable id, resolving the pid from the record
    /// rather than the in-process registry; this path works for callers
    /// that never shared the registry, such as a one-shot CLI.
    pub async fn stop_task(&self, id: i64) -> Result<StopOutcome, PlatformError> {
        let key = id.to_string();
        let task = match self.tm_platform.gets_task(id).await {
            Ok(task) => task,
            Err(e) => {
                log::debug!("stop for unknown task {id}: {e}");
                return Ok(StopOutcome {
                    key,
                    pid: None,
                    status: StopStatus::NotFound,
                    message: format!("no task with id {id}"),
                });
            }
        };
        let pid = match (task.status(), task.pid) {
            (TaskStatus::Running, Some(pid)) => pid,
            _ => return Ok(StopOutcome {
                key,
                pid: None,
                status: StopStatus::NotFound,
                message: format!("task {id} is not running"),
            }),
        };
        log::info!("stopping task {id} (pid {pid})");
        match terminate_group(pid) {
            Ok(()) => {
                if let Some(cache_key) = task.cache_key() {
                    self.cache.remove(cache_key);
                }
                match self.tm_platform.cancel(id, "stopped by request").await {
                    Ok(true) => (),
                    Ok(false) => log::debug!("task {id} already terminal at stop"),
                    Err(e) => log::warn!("unable to close out stopped task {id}: {e}"),
                }
                Ok(StopOutcome {
                    key,
                    pid: Some(pid),
                    status: StopStatus::Stopped,
                    message: "process group terminated".to_string(),
                })
            }
            Err(e) => Ok(StopOutcome {
                key,
                pid: Some(pid),
                status: StopStatus::SignalFailed,
                message: e.to_string(),
            }),
        }
    }

    /// Stop everything the store says is running; one outcome per
    /// record, best effort.
    pub async fn stop_running_tasks(&self) -> Result<Vec<StopOutcome>, PlatformError> {
        let tasks = self.tm_platform.lists_task().await?;
        let mut outcomes = Vec::new();
        for task in tasks.iter() {
            if task.status() == TaskStatus::Running {
                outcomes.push(self.stop_task(task.id).await?);
            }
        }
        Ok(outcomes)
    }

    /// Render the report for a completed task; renderer failure is data
    /// in the outcome and leaves the task untouched.
    pub async fn generate_report(
        &self,
        task_id: i64,
    ) -> Result<ReportOutcome, PlatformError> {
        let task = self.tm_platform.gets_task(task_id).await?;
        let outcome = report::generate(&self.settings, &task).await?;
        if outcome.success {
            if let Some(path) = &outcome.report_path {
                self.tm_platform.set_report(task_id, path).await?;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use jmtcore::{
        cache::{
            MemoryTaskCache,
            TaskCache,
        },
        platform::{
            MemoryPlatform,
            TMPlatform,
        },
        task::TaskStatus,
    };
    use jmttqs::process::process_exists;
    use std::{
        path::Path,
        sync::Arc,
        time::Duration,
    };
    use tempfile::TempDir;
    use test_binary::build_test_binary_once;

    use crate::{
        error::PlatformError,
        platform::{
            Platform,
            StopStatus,
        },
        settings::Settings,
    };

    fn bin(name: &str) -> String {
        match name {
            "sentinel" => {
                build_test_binary_once!(sentinel, "../testing");
                path_to_sentinel().into_string().expect("valid string")
            }
            "exit_code" => {
                build_test_binary_once!(exit_code, "../testing");
                path_to_exit_code().into_string().expect("valid string")
            }
            "sleeper" => {
                build_test_binary_once!(sleeper, "../testing");
                path_to_sleeper().into_string().expect("valid string")
            }
            _ => unreachable!(),
        }
    }

    // a storage layout whose "jmeter" is one of the helper binaries
    fn test_settings(root: &Path, runner: &str) -> Settings {
        let home = root.join("home");
        std::fs::create_dir_all(home.join("bin")).expect("home dir");
        std::fs::copy(bin(runner), home.join("bin").join("jmeter"))
            .expect("install fake jmeter");
        let settings = Settings {
            plan_root: root.join("jmx_files"),
            log_root: root.join("jtl_files"),
            report_root: root.join("reports"),
            jmeter_home: home,
            .. Default::default()
        };
        settings.ensure_dirs().expect("storage roots");
        settings
    }

    fn write_plan(settings: &Settings, name: &str) {
        std::fs::write(
            settings.plan_root.join(name),
            b"<jmeterTestPlan/>",
        ).expect("plan file");
    }

    fn harness(root: &Path, runner: &str) -> Platform<MemoryPlatform> {
        Platform::new(
            Arc::new(MemoryPlatform::default()),
            Arc::new(MemoryTaskCache::new()),
            test_settings(root, runner),
        )
    }

    #[tokio::test]
    async fn execute_plan_to_completed() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sentinel");
        write_plan(platform.settings(), "smoke.jmx");

        let task = platform.execute_plan("smoke.jmx").await?;
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.exit_status, Some(0));
        assert_eq!(task.pid, None);
        assert!(task.start_ts.is_some());
        assert!(task.stop_ts.is_some());
        assert_eq!(task.plan_hash.as_ref().map(|h| h.len()), Some(64));

        let output = task.output_path.as_deref().expect("output path");
        let key = task.cache_key().expect("cache key");
        assert!(key.starts_with("smoke_"));
        assert!(key.ends_with(".jtl"));

        // the exact argument vector went to the process untouched
        let stdout = task.stdout.as_deref().expect("captured stdout");
        assert!(stdout.contains("\"-n\""));
        assert!(stdout.contains(output));
        assert!(stdout.contains("-Jjmeter.save.saveservice.output_format=xml"));

        // nothing left registered
        assert!(platform.cache_entries().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn execute_missing_plan_reports_not_found() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sentinel");

        match platform.execute_plan("absent.jmx").await {
            Err(PlatformError::NotFound(_)) => (),
            other => panic!("expected not found, got {other:?}"),
        }
        // refused before any record was created
        assert!(platform.list_tasks().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn traversal_reference_is_refused() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sentinel");

        for name in ["../smoke.jmx", "/etc/smoke.jmx", "smoke.jtl"] {
            match platform.execute_plan(name).await {
                Err(PlatformError::Validation(_)) => (),
                other => panic!("expected validation error for {name}, got {other:?}"),
            }
        }
        assert!(platform.list_tasks().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn launch_failure_fails_the_task() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sentinel");
        write_plan(platform.settings(), "smoke.jmx");
        // pull the binary out from under the launch
        std::fs::remove_file(platform.settings().jmeter_bin())?;

        let task = platform.execute_plan("smoke.jmx").await?;
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(task.error_msg.as_deref().expect("diagnostic")
            .contains("unable to launch"));
        assert!(platform.cache_entries().is_empty());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawn_then_immediate_stop_leaves_no_orphan() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sleeper");
        write_plan(platform.settings(), "soak.jmx");

        let task = platform.spawn_plan("soak.jmx").await?;
        assert!(!task.status().is_terminal());
        let key = task.cache_key().expect("cache key").to_string();
        let entry = platform.cache.get(&key).expect("registered by return time");

        let outcome = platform.stop_by_key(&key).await;
        assert_eq!(outcome.status, StopStatus::Stopped);
        assert_eq!(outcome.pid, Some(entry.pid));
        assert!(outcome.success());

        let task = platform.task(task.id).await?;
        assert_eq!(task.status(), TaskStatus::Cancelled);

        // second stop: distinctly "nothing to stop", never an error
        let outcome = platform.stop_by_key(&key).await;
        assert_eq!(outcome.status, StopStatus::NotFound);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!process_exists(entry.pid));
        Ok(())
    }

    #[tokio::test]
    async fn stop_after_natural_completion_reports_not_found() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sentinel");
        write_plan(platform.settings(), "smoke.jmx");

        let task = platform.execute_plan("smoke.jmx").await?;
        assert_eq!(task.status(), TaskStatus::Completed);

        let outcome = platform.stop_by_key(task.cache_key().expect("key")).await;
        assert_eq!(outcome.status, StopStatus::NotFound);
        // the record was not disturbed
        let task = platform.task(task.id).await?;
        assert_eq!(task.status(), TaskStatus::Completed);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_all_is_best_effort_per_key() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sleeper");
        write_plan(platform.settings(), "soak-a.jmx");
        write_plan(platform.settings(), "soak-b.jmx");

        let first = platform.spawn_plan("soak-a.jmx").await?;
        let second = platform.spawn_plan("soak-b.jmx").await?;
        assert_eq!(platform.cache_entries().len(), 2);

        let outcomes = platform.stop_all().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|outcome| outcome.status == StopStatus::Stopped));

        for id in [first.id, second.id] {
            assert_eq!(platform.task(id).await?.status(), TaskStatus::Cancelled);
        }
        // everything already stopped; nothing left to enumerate
        assert!(platform.stop_all().await.is_empty());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_task_by_durable_id() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sleeper");
        write_plan(platform.settings(), "soak.jmx");

        let task = platform.spawn_plan("soak.jmx").await?;
        // wait out the window between registration and the run stamp
        let mut running = platform.task(task.id).await?;
        while running.status() == TaskStatus::Pending {
            tokio::time::sleep(Duration::from_millis(5)).await;
            running = platform.task(task.id).await?;
        }

        let outcome = platform.stop_task(task.id).await?;
        assert_eq!(outcome.status, StopStatus::Stopped);
        assert_eq!(platform.task(task.id).await?.status(), TaskStatus::Cancelled);
        // the registry entry went with it
        assert!(platform.cache_entries().is_empty());

        let outcome = platform.stop_task(task.id).await?;
        assert_eq!(outcome.status, StopStatus::NotFound);

        let outcome = platform.stop_task(9999).await?;
        assert_eq!(outcome.status, StopStatus::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn queue_plan_stays_pending_until_claimed() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sentinel");
        write_plan(platform.settings(), "smoke.jmx");

        let task = platform.queue_plan("smoke.jmx").await?;
        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(platform.cache_entries().is_empty());

        // a polling runner would claim exactly this record
        let claimed = platform.tm_platform.start_task().await?
            .expect("claimable");
        assert_eq!(claimed.id(), task.id);
        Ok(())
    }

    #[tokio::test]
    async fn report_success_is_recorded() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sentinel");
        write_plan(platform.settings(), "smoke.jmx");

        let task = platform.execute_plan("smoke.jmx").await?;
        assert_eq!(task.status(), TaskStatus::Completed);
        // the helper runner does not write a result log; stand one up
        std::fs::write(task.output_path.as_deref().expect("output path"), b"ok")?;

        let outcome = platform.generate_report(task.id).await?;
        assert!(outcome.success, "{}", outcome.message);
        let report_path = outcome.report_path.expect("report path");

        let task = platform.task(task.id).await?;
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.report_path.as_deref(), Some(report_path.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn report_failure_never_demotes_completed() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sentinel");
        write_plan(platform.settings(), "smoke.jmx");

        let task = platform.execute_plan("smoke.jmx").await?;
        std::fs::write(task.output_path.as_deref().expect("output path"), b"ok")?;

        // swap the renderer for one that exits non-zero
        std::fs::copy(
            bin("exit_code"),
            platform.settings().jmeter_bin(),
        )?;
        let outcome = platform.generate_report(task.id).await?;
        assert!(!outcome.success);
        assert_eq!(outcome.report_path, None);

        let task = platform.task(task.id).await?;
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.report_path, None);
        Ok(())
    }

    #[tokio::test]
    async fn report_for_unfinished_task_is_refused() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let platform = harness(root.path(), "sentinel");
        write_plan(platform.settings(), "smoke.jmx");

        let task = platform.queue_plan("smoke.jmx").await?;
        match platform.generate_report(task.id).await {
            Err(PlatformError::Validation(_)) => (),
            other => panic!("expected validation error, got {other:?}"),
        }
        Ok(())
    }
}
