use std::fmt::{
    Display,
    Formatter,
};
use crate::{
    error::BackendError,
    platform::TMPlatform,
    task::{
        Task,
        TaskRef,
    },
};

/// A task carried across thread or runtime boundaries, detached from the
/// platform that produced it.  Rebinding verifies the platform url so a
/// record cannot be replayed against an unrelated store.
pub struct TaskDetached {
    pub(super) inner: Task,
    pub(super) url: String,
}

impl<P: TMPlatform + Sized> TaskRef<'_, P> {
    pub fn detach(self) -> TaskDetached {
        TaskDetached {
            inner: self.inner,
            url: self.platform.url().to_string(),
        }
    }
}

impl TaskDetached {
    pub fn bind<'a, P: TMPlatform + Sized>(
        self,
        platform: &'a P,
    ) -> Result<TaskRef<'a, P>, BackendError> {
        if self.url == platform.url() {
            Ok(self.inner.bind(platform))
        } else {
            Err(BackendError::NonMatchingBind)
        }
    }

    pub fn id(&self) -> i64 {
        self.inner.id
    }
}

impl Display for TaskDetached {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task {{ id: {}, bin_path: {:?} }}", self.inner.id, self.inner.bin_path)
    }
}
