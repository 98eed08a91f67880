use mockall::predicate::eq;
use jmtcore::{
    platform::TMPlatform,
    task::{
        Task,
        TaskStatus,
    },
};

use test_jmt::core::MockPlatform;

#[async_std::test]
async fn test_ref_impls() -> anyhow::Result<()> {
    let mut platform = MockPlatform::new();
    let task_id = 1;
    let task_pid = 123;
    let task_exit = 0;
    platform.expect_start()
        .times(1)
        .with()
        .returning(move || Ok(Some(
            Task {
                id: task_id,
                .. Default::default()
            },
        )));
    platform.expect_run()
        .times(1)
        .with(eq(task_id), eq(task_pid))
        .returning(|_, _| Ok(true));
    platform.expect_complete()
        .times(1)
        .with(eq(task_id), eq(task_exit))
        .returning(|_, _| Ok(true));

    let mut task_ref = platform.start_task()
        .await?
        .expect("task started");
    assert_eq!(task_ref.pid(), None);
    task_ref.run(task_pid).await?;
    assert_eq!(task_ref.pid(), Some(task_pid));
    assert_eq!(task_ref.status(), TaskStatus::Running);

    assert_eq!(task_ref.exit_status(), None);
    task_ref.complete(task_exit).await?;
    assert_eq!(task_ref.exit_status(), Some(task_exit));
    assert_eq!(task_ref.status(), TaskStatus::Completed);

    assert_eq!(task_ref.into_inner(), Task {
        id: 1,
        status: TaskStatus::Completed.into(),
        pid: None,
        exit_status: Some(0),
        .. Default::default()
    });
    Ok(())
}

#[async_std::test]
async fn test_ref_rejected_transition_leaves_ref_unchanged() -> anyhow::Result<()> {
    let mut platform = MockPlatform::new();
    platform.expect_start()
        .times(1)
        .returning(|| Ok(Some(
            Task {
                id: 2,
                status: TaskStatus::Cancelled.into(),
                .. Default::default()
            },
        )));
    // the backend refuses the transition; the ref must not pretend
    platform.expect_run()
        .times(1)
        .returning(|_, _| Ok(false));

    let mut task_ref = platform.start_task()
        .await?
        .expect("task started");
    assert!(!task_ref.run(9).await?);
    assert_eq!(task_ref.pid(), None);
    assert_eq!(task_ref.status(), TaskStatus::Cancelled);
    Ok(())
}

#[async_std::test]
async fn test_detached_bind_checks_platform() -> anyhow::Result<()> {
    let mut source = MockPlatform::new();
    source.expect_start()
        .times(1)
        .returning(|| Ok(Some(Task { id: 3, .. Default::default() })));
    source.expect_url()
        .return_const("mock:source".to_string());

    let mut other = MockPlatform::new();
    other.expect_url()
        .return_const("mock:other".to_string());

    let detached = source.start_task()
        .await?
        .expect("task started")
        .detach();
    assert_eq!(detached.id(), 3);
    // a record cannot be replayed against an unrelated platform
    assert!(detached.bind(&other).is_err());
    Ok(())
}
