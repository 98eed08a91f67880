use jmtcore::{
    cache::TaskCache,
    platform::TMPlatform,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::settings::Settings;

/// The lifecycle platform: validates execute requests, owns the task
/// records through the task-management backend, and fronts the process
/// registry for the stop-by-key API.
///
/// Constructed once at startup and handed by reference (or clone) to
/// whatever serves requests; there is no ambient instance.
pub struct Platform<TMP: TMPlatform> {
    pub tm_platform: Arc<TMP>,
    pub(crate) cache: Arc<dyn TaskCache>,
    pub(crate) settings: Settings,
}

impl<TMP: TMPlatform> Clone for Platform<TMP> {
    fn clone(&self) -> Self {
        Self {
            tm_platform: self.tm_platform.clone(),
            cache: self.cache.clone(),
            settings: self.settings.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub enum StopStatus {
    /// The process group was signalled and the record closed out.
    Stopped,
    /// Nothing was registered under the key; either the task never
    /// launched or it already ended.  Not an error.
    NotFound,
    /// A process was registered but the signal could not be delivered;
    /// the registry entry is dropped regardless.
    SignalFailed,
}

/// Outcome of one stop request, keyed the way the request was made.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StopOutcome {
    pub key: String,
    pub pid: Option<i64>,
    pub status: StopStatus,
    pub message: String,
}

impl StopOutcome {
    pub fn success(&self) -> bool {
        self.status == StopStatus::Stopped
    }
}

mod impls;
