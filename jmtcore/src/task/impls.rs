use std::{
    ops::Deref,
    process,
};
use crate::{
    error::ValueError,
    platform::TMPlatform,
    task::*,
};

impl From<&str> for TaskArg {
    fn from(s: &str) -> Self {
        Self { arg: s.into(), .. Default::default() }
    }
}

impl From<String> for TaskArg {
    fn from(arg: String) -> Self {
        Self { arg, .. Default::default() }
    }
}

impl From<Vec<TaskArg>> for TaskArgs {
    fn from(args: Vec<TaskArg>) -> Self {
        Self(args)
    }
}

impl FromIterator<String> for TaskArgs {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().map(TaskArg::from).collect())
    }
}

impl Deref for TaskArgs {
    type Target = Vec<TaskArg>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> From<&'a TaskArgs> for Vec<&'a str> {
    fn from(task_args: &'a TaskArgs) -> Self {
        task_args.iter()
            .map(|task_arg| task_arg.arg.as_ref())
            .collect()
    }
}

impl From<Vec<Task>> for Tasks {
    fn from(tasks: Vec<Task>) -> Self {
        Self(tasks)
    }
}

impl Deref for Tasks {
    type Target = Vec<Task>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<&Task> for process::Command {
    type Error = ValueError;

    fn try_from(task: &Task) -> Result<Self, Self::Error> {
        let mut cmd = process::Command::new(&task.bin_path);
        cmd.args::<Vec<&str>, &str>(
            task.args
                .as_ref()
                .ok_or(ValueError::Uninitialized)?
                .into()
        );
        Ok(cmd)
    }
}

impl<P: TMPlatform + Sized> TryFrom<&TaskRef<'_, P>> for process::Command {
    type Error = ValueError;

    fn try_from(task: &TaskRef<P>) -> Result<Self, Self::Error> {
        (&task.inner).try_into()
    }
}


#[cfg(feature = "tokio")]
mod tokio_impls {
    use tokio::process::Command;
    use super::*;

    impl TryFrom<&Task> for Command {
        type Error = ValueError;

        fn try_from(task: &Task) -> Result<Self, Self::Error> {
            let mut cmd = Command::new(&task.bin_path);
            cmd.args::<Vec<&str>, &str>(
                task.args
                    .as_ref()
                    .ok_or(ValueError::Uninitialized)?
                    .into()
            );
            Ok(cmd)
        }
    }

    impl<P: TMPlatform + Sized> TryFrom<&TaskRef<'_, P>> for Command {
        type Error = ValueError;

        fn try_from(task: &TaskRef<P>) -> Result<Self, Self::Error> {
            (&task.inner).try_into()
        }
    }
}
