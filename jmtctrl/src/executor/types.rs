use jmtcore::platform::TMPlatform;

use crate::platform::Platform;

/// Platform-wrapping executor for the background runner; a completed
/// run optionally flows straight into report generation.
pub struct Executor<TMP: TMPlatform> {
    pub(crate) platform: Platform<TMP>,
}

impl<TMP: TMPlatform> Clone for Executor<TMP> {
    fn clone(&self) -> Self {
        Self {
            platform: self.platform.clone(),
        }
    }
}
