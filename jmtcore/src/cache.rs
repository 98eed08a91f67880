use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The live mapping from a lookup key to a running process.
///
/// Keys are, for compatibility with the upload-oriented stop API, the
/// derived output-file names; the entry carries the task id as the
/// durable identity so a stop can cancel the record as well as signal
/// the process group.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct CacheEntry {
    pub task_id: i64,
    pub pid: i64,
}

/// Process registry contract.
///
/// Lookups against missing keys are a normal outcome, not an error; a
/// task that never launched and a task that already stopped both read as
/// absent.  Implementations must keep each operation a short critical
/// section and return point-in-time snapshots from the enumerations.
pub trait TaskCache: Send + Sync {
    /// Insert or overwrite; last set wins.  `None` ttl means the entry
    /// stays until removed.
    fn set(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>);
    fn get(&self, key: &str) -> Option<CacheEntry>;
    /// Idempotent; reports whether an entry existed.
    fn remove(&self, key: &str) -> bool;
    fn get_all(&self) -> Vec<(String, CacheEntry)>;
    fn get_all_keys(&self) -> Vec<String>;
}

mod memory;
pub use memory::MemoryTaskCache;
