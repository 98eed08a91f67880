use async_trait::async_trait;
use jmtcore::{
    error::{
        BackendError,
        task::TaskError,
    },
    task::{
        Task,
        TaskArg,
        TaskArgs,
        TaskStatus,
        Tasks,
        traits::TaskBackend,
    },
};
use sqlx::{
    Row,
    sqlite::SqliteRow,
};

use crate::{
    SqliteBackend,
    chrono::Utc,
};

fn task_from_row(row: SqliteRow) -> Task {
    Task {
        id: row.get("id"),
        status: row.get("status"),
        bin_path: row.get("bin_path"),
        plan_path: row.get("plan_path"),
        plan_hash: row.get("plan_hash"),
        output_path: row.get("output_path"),
        report_path: row.get("report_path"),
        basedir: row.get("basedir"),
        pid: row.get("pid"),
        created_ts: row.get("created_ts"),
        start_ts: row.get("start_ts"),
        stop_ts: row.get("stop_ts"),
        exit_status: row.get("exit_status"),
        stdout: row.get("stdout"),
        stderr: row.get("stderr"),
        error_msg: row.get("error_msg"),
        args: None,
    }
}

const TASK_COLUMNS: &str = "\
    id, \
    status, \
    bin_path, \
    plan_path, \
    plan_hash, \
    output_path, \
    report_path, \
    basedir, \
    pid, \
    created_ts, \
    start_ts, \
    stop_ts, \
    exit_status, \
    stdout, \
    stderr, \
    error_msg\
";

async fn adds_task_sqlite(
    sqlite: &SqliteBackend,
    mut task: Task,
) -> Result<Task, TaskError> {
    if task.id > 0 {
        return Err(TaskError::TaskAlreadyQueued(task.id));
    }

    let mut tx = sqlite.pool.begin().await
        .map_err(BackendError::from)?;
    let created_ts = Utc::now().timestamp();
    let status = i64::from(TaskStatus::Pending);
    let args = task.args.take();

    let id = sqlx::query(
        "
INSERT INTO task (
    status,
    bin_path,
    plan_path,
    plan_hash,
    output_path,
    basedir,
    created_ts
)
VALUES ( ?1, ?2, ?3, ?4, ?5, ?6, ?7 )\
        ",
    )
        .bind(status)
        .bind(&task.bin_path)
        .bind(&task.plan_path)
        .bind(&task.plan_hash)
        .bind(&task.output_path)
        .bind(&task.basedir)
        .bind(created_ts)
        .execute(&mut *tx)
        .await.map_err(BackendError::from)?
        .last_insert_rowid();

    let args = match args {
        Some(args) => {
            let mut results: Vec<TaskArg> = Vec::new();
            for arg in args.iter() {
                // TaskArg has no direct insertion API, so any incoming
                // id only generates a warning.
                if arg.id > 0 {
                    log::warn!("got an existing id for arg: {}", arg.id);
                }
                if arg.task_id > 0 {
                    log::warn!("got an existing task_id for arg: {}", arg.task_id);
                }
                let task_arg_id = sqlx::query(
                    "
INSERT INTO task_arg (
    task_id,
    arg
)
VALUES ( ?1, ?2 )\
                    ",
                )
                    .bind(id)
                    .bind(&arg.arg)
                    .execute(&mut *tx)
                    .await.map_err(BackendError::from)?
                    .last_insert_rowid();
                results.push(TaskArg {
                    id: task_arg_id,
                    task_id: id,
                    arg: arg.arg.clone(),
                })
            }
            Some(results.into())
        }
        None => None,
    };
    tx.commit().await.map_err(BackendError::from)?;

    Ok(Task {
        id,
        status,
        created_ts,
        args,
        .. task
    })
}

async fn gets_task_args_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
) -> Result<TaskArgs, BackendError> {
    Ok(sqlx::query(
        "
SELECT
    id,
    task_id,
    arg
FROM
    task_arg
WHERE
    task_id = ?1
ORDER BY
    id
        ",
    )
        .bind(id)
        .map(|row: SqliteRow| TaskArg {
            id: row.get("id"),
            task_id: row.get("task_id"),
            arg: row.get("arg"),
        })
        .fetch_all(&*sqlite.pool)
        .await?
        .into()
    )
}

async fn gets_task_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
) -> Result<Task, BackendError> {
    let mut result = sqlx::query(
        &format!("SELECT {TASK_COLUMNS} FROM task WHERE id = ?1"),
    )
        .bind(id)
        .map(task_from_row)
        .fetch_one(&*sqlite.pool)
        .await?;
    result.args = Some(gets_task_args_sqlite(sqlite, id).await?);

    Ok(result)
}

async fn lists_task_sqlite(
    sqlite: &SqliteBackend,
) -> Result<Tasks, BackendError> {
    // args are left unloaded here; the listing is a status snapshot.
    Ok(sqlx::query(
        &format!("SELECT {TASK_COLUMNS} FROM task ORDER BY id"),
    )
        .map(task_from_row)
        .fetch_all(&*sqlite.pool)
        .await?
        .into()
    )
}

async fn start_task_sqlite(
    sqlite: &SqliteBackend,
) -> Result<Option<Task>, BackendError> {
    let start_ts = Utc::now().timestamp();
    let pending = i64::from(TaskStatus::Pending);
    // ids auto-increment, so the earliest queued task has the lowest id.
    let mut result = sqlx::query(
        &format!(
            "
UPDATE
    task
SET
    start_ts = ?1
WHERE id = (
    SELECT
        id
    FROM
        task
    WHERE
        start_ts IS NULL AND
        status = ?2
    ORDER BY
        id
    LIMIT 1
)
RETURNING
    {TASK_COLUMNS}
            ",
        ),
    )
        .bind(start_ts)
        .bind(pending)
        .map(task_from_row)
        .fetch_optional(&*sqlite.pool)
        .await?;
    if let Some(result) = result.as_mut() {
        result.args = Some(gets_task_args_sqlite(sqlite, result.id).await?);
    }
    Ok(result)
}

async fn claim_task_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
) -> Result<Option<Task>, BackendError> {
    let start_ts = Utc::now().timestamp();
    let pending = i64::from(TaskStatus::Pending);
    let mut result = sqlx::query(
        &format!(
            "
UPDATE
    task
SET
    start_ts = ?1
WHERE
    id = ?2 AND
    start_ts IS NULL AND
    status = ?3
RETURNING
    {TASK_COLUMNS}
            ",
        ),
    )
        .bind(start_ts)
        .bind(id)
        .bind(pending)
        .map(task_from_row)
        .fetch_optional(&*sqlite.pool)
        .await?;
    if let Some(result) = result.as_mut() {
        result.args = Some(gets_task_args_sqlite(sqlite, result.id).await?);
    }
    Ok(result)
}

async fn run_task_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
    pid: i64,
) -> Result<bool, BackendError> {
    let running = i64::from(TaskStatus::Running);
    let pending = i64::from(TaskStatus::Pending);
    let rows_affected = sqlx::query(
        "
UPDATE
    task
SET
    status = ?3,
    pid = ?2
WHERE
    id = ?1 AND
    status = ?4
        ",
    )
        .bind(id)
        .bind(pid)
        .bind(running)
        .bind(pending)
        .execute(&*sqlite.pool)
        .await?
        .rows_affected();
    Ok(rows_affected > 0)
}

async fn complete_task_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
    exit_status: i64,
) -> Result<bool, BackendError> {
    let stop_ts = Utc::now().timestamp();
    let status = i64::from(if exit_status == 0 {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    });
    let running = i64::from(TaskStatus::Running);
    let rows_affected = sqlx::query(
        "
UPDATE
    task
SET
    status = ?4,
    pid = NULL,
    stop_ts = ?2,
    exit_status = ?3
WHERE
    id = ?1 AND
    status = ?5
        ",
    )
        .bind(id)
        .bind(stop_ts)
        .bind(exit_status)
        .bind(status)
        .bind(running)
        .execute(&*sqlite.pool)
        .await?
        .rows_affected();
    Ok(rows_affected > 0)
}

async fn close_task_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
    status: TaskStatus,
    msg: &str,
) -> Result<bool, BackendError> {
    let stop_ts = Utc::now().timestamp();
    let status = i64::from(status);
    let pending = i64::from(TaskStatus::Pending);
    let running = i64::from(TaskStatus::Running);
    let rows_affected = sqlx::query(
        "
UPDATE
    task
SET
    status = ?2,
    pid = NULL,
    stop_ts = ?3,
    error_msg = ?4
WHERE
    id = ?1 AND
    status IN ( ?5, ?6 )
        ",
    )
        .bind(id)
        .bind(status)
        .bind(stop_ts)
        .bind(msg)
        .bind(pending)
        .bind(running)
        .execute(&*sqlite.pool)
        .await?
        .rows_affected();
    Ok(rows_affected > 0)
}

async fn set_report_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
    report_path: &str,
) -> Result<bool, BackendError> {
    let completed = i64::from(TaskStatus::Completed);
    let rows_affected = sqlx::query(
        "
UPDATE
    task
SET
    report_path = ?2
WHERE
    id = ?1 AND
    status = ?3
        ",
    )
        .bind(id)
        .bind(report_path)
        .bind(completed)
        .execute(&*sqlite.pool)
        .await?
        .rows_affected();
    Ok(rows_affected > 0)
}

async fn set_captured_sqlite(
    sqlite: &SqliteBackend,
    id: i64,
    stdout: &str,
    stderr: &str,
) -> Result<bool, BackendError> {
    let rows_affected = sqlx::query(
        "
UPDATE
    task
SET
    stdout = ?2,
    stderr = ?3
WHERE
    id = ?1
        ",
    )
        .bind(id)
        .bind(stdout)
        .bind(stderr)
        .execute(&*sqlite.pool)
        .await?
        .rows_affected();
    Ok(rows_affected > 0)
}

#[async_trait]
impl TaskBackend for SqliteBackend {
    async fn adds_task(
        &self,
        task: Task,
    ) -> Result<Task, TaskError> {
        adds_task_sqlite(self, task).await
    }
    async fn gets_task(
        &self,
        id: i64,
    ) -> Result<Task, BackendError> {
        gets_task_sqlite(self, id).await
    }
    async fn lists_task(
        &self,
    ) -> Result<Tasks, BackendError> {
        lists_task_sqlite(self).await
    }
    async fn start(
        &self,
    ) -> Result<Option<Task>, BackendError> {
        start_task_sqlite(self).await
    }
    async fn claim(
        &self,
        id: i64,
    ) -> Result<Option<Task>, BackendError> {
        claim_task_sqlite(self, id).await
    }
    async fn run(
        &self,
        id: i64,
        pid: i64,
    ) -> Result<bool, BackendError> {
        run_task_sqlite(self, id, pid).await
    }
    async fn complete(
        &self,
        id: i64,
        exit_status: i64,
    ) -> Result<bool, BackendError> {
        complete_task_sqlite(self, id, exit_status).await
    }
    async fn fail(
        &self,
        id: i64,
        msg: &str,
    ) -> Result<bool, BackendError> {
        close_task_sqlite(self, id, TaskStatus::Failed, msg).await
    }
    async fn cancel(
        &self,
        id: i64,
        msg: &str,
    ) -> Result<bool, BackendError> {
        close_task_sqlite(self, id, TaskStatus::Cancelled, msg).await
    }
    async fn set_report(
        &self,
        id: i64,
        report_path: &str,
    ) -> Result<bool, BackendError> {
        set_report_sqlite(self, id, report_path).await
    }
    async fn set_captured(
        &self,
        id: i64,
        stdout: &str,
        stderr: &str,
    ) -> Result<bool, BackendError> {
        set_captured_sqlite(self, id, stdout, stderr).await
    }
}

#[cfg(test)]
mod tests {
    use jmtcore::task::{
        Task,
        TaskArg,
        TaskStatus,
        traits::TaskBackend,
    };
    use crate::SqliteBackend;

    fn demo_task() -> Task {
        Task {
            bin_path: "/opt/apache-jmeter-5.5/bin/jmeter".into(),
            plan_path: "plans/smoke.jmx".into(),
            output_path: Some("logs/smoke-20230512.jtl".into()),
            basedir: "/tmp".into(),
            args: Some(["-n", "-t", "plans/smoke.jmx"].iter()
                .map(|a| TaskArg {
                    arg: a.to_string(),
                    .. Default::default()
                })
                .collect::<Vec<_>>()
                .into()),
            .. Default::default()
        }
    }

    #[tokio::test]
    async fn test_adds_task() -> anyhow::Result<()> {
        let backend = SqliteBackend::tm("sqlite::memory:").await?;

        let task = TaskBackend::adds_task(&backend, demo_task()).await?;

        // assigned ids and values are all in place.
        assert_eq!(task.id, 1);
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.created_ts, 1234567890);
        assert_eq!(&task.bin_path, "/opt/apache-jmeter-5.5/bin/jmeter");
        assert_eq!(task.args, Some(serde_json::from_str(r#"[
            {
                "id": 1,
                "task_id": 1,
                "arg": "-n"
            },
            {
                "id": 2,
                "task_id": 1,
                "arg": "-t"
            },
            {
                "id": 3,
                "task_id": 1,
                "arg": "plans/smoke.jmx"
            }
        ]"#)?));

        // and round-trips through gets_task.
        let fetched = TaskBackend::gets_task(&backend, 1).await?;
        assert_eq!(fetched, task);

        // a task with an id cannot be queued again.
        assert!(TaskBackend::adds_task(&backend, fetched).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_start_task() -> anyhow::Result<()> {
        let backend = SqliteBackend::tm("sqlite::memory:").await?;

        // no tasks queued.
        assert!(TaskBackend::start(&backend).await?.is_none());

        let task = TaskBackend::adds_task(&backend, demo_task()).await?;
        let started = TaskBackend::start(&backend).await?
            .expect("queued task claimed");
        assert_eq!(started.id, task.id);
        assert_eq!(started.start_ts, Some(1234567890));
        assert_eq!(started.args, task.args);

        // a claimed task is not handed out twice.
        assert!(TaskBackend::start(&backend).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_run_complete() -> anyhow::Result<()> {
        let backend = SqliteBackend::tm("sqlite::memory:").await?;
        let task = TaskBackend::adds_task(&backend, demo_task()).await?;
        TaskBackend::start(&backend).await?;

        assert!(TaskBackend::run(&backend, task.id, 12345).await?);
        let running = TaskBackend::gets_task(&backend, task.id).await?;
        assert_eq!(running.status(), TaskStatus::Running);
        assert_eq!(running.pid, Some(12345));

        assert!(TaskBackend::complete(&backend, task.id, 0).await?);
        let done = TaskBackend::gets_task(&backend, task.id).await?;
        assert_eq!(done.status(), TaskStatus::Completed);
        assert_eq!(done.pid, None);
        assert_eq!(done.exit_status, Some(0));
        assert_eq!(done.stop_ts, Some(1234567890));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_nonzero_fails() -> anyhow::Result<()> {
        let backend = SqliteBackend::tm("sqlite::memory:").await?;
        let task = TaskBackend::adds_task(&backend, demo_task()).await?;
        TaskBackend::start(&backend).await?;
        TaskBackend::run(&backend, task.id, 1).await?;

        assert!(TaskBackend::complete(&backend, task.id, 2).await?);
        let done = TaskBackend::gets_task(&backend, task.id).await?;
        assert_eq!(done.status(), TaskStatus::Failed);
        assert_eq!(done.exit_status, Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn test_terminal_absorption() -> anyhow::Result<()> {
        let backend = SqliteBackend::tm("sqlite::memory:").await?;
        let task = TaskBackend::adds_task(&backend, demo_task()).await?;
        TaskBackend::start(&backend).await?;
        TaskBackend::run(&backend, task.id, 1).await?;
        TaskBackend::cancel(&backend, task.id, "stop requested").await?;

        // none of the transitions apply to a cancelled task.
        assert!(!TaskBackend::run(&backend, task.id, 2).await?);
        assert!(!TaskBackend::complete(&backend, task.id, 0).await?);
        assert!(!TaskBackend::fail(&backend, task.id, "nope").await?);
        assert!(!TaskBackend::cancel(&backend, task.id, "nope").await?);

        let done = TaskBackend::gets_task(&backend, task.id).await?;
        assert_eq!(done.status(), TaskStatus::Cancelled);
        assert_eq!(done.error_msg.as_deref(), Some("stop requested"));
        Ok(())
    }

    #[tokio::test]
    async fn test_report_guard() -> anyhow::Result<()> {
        let backend = SqliteBackend::tm("sqlite::memory:").await?;
        let task = TaskBackend::adds_task(&backend, demo_task()).await?;

        // not completed yet.
        assert!(!TaskBackend::set_report(&backend, task.id, "reports/smoke").await?);

        TaskBackend::start(&backend).await?;
        TaskBackend::run(&backend, task.id, 1).await?;
        TaskBackend::complete(&backend, task.id, 0).await?;
        assert!(TaskBackend::set_report(&backend, task.id, "reports/smoke").await?);
        assert_eq!(
            TaskBackend::gets_task(&backend, task.id).await?.report_path.as_deref(),
            Some("reports/smoke"),
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_lists_task() -> anyhow::Result<()> {
        let backend = SqliteBackend::tm("sqlite::memory:").await?;
        TaskBackend::adds_task(&backend, demo_task()).await?;
        TaskBackend::adds_task(&backend, demo_task()).await?;
        TaskBackend::adds_task(&backend, demo_task()).await?;

        let tasks = TaskBackend::lists_task(&backend).await?;
        assert_eq!(tasks.len(), 3);
        assert_eq!(
            tasks.iter().map(|task| task.id).collect::<Vec<_>>(),
            vec![1, 2, 3],
        );
        Ok(())
    }
}
