use parking_lot::RwLock;
use std::{
    collections::HashMap,
    time::{
        Duration,
        Instant,
    },
};

use super::{
    CacheEntry,
    TaskCache,
};

struct Slot {
    entry: CacheEntry,
    deadline: Option<Instant>,
}

impl Slot {
    fn live(&self, now: Instant) -> bool {
        self.deadline.map_or(true, |deadline| now < deadline)
    }
}

/// In-memory process registry.
///
/// TTL is honored: an expired entry is never returned from any read and
/// is dropped from storage by `purge_expired` or the next overwrite of
/// its key.
#[derive(Default)]
pub struct MemoryTaskCache {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryTaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|_, slot| slot.live(now));
        before - slots.len()
    }
}

impl TaskCache for MemoryTaskCache {
    fn set(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>) {
        let slot = Slot {
            entry,
            deadline: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.slots.write().insert(key.to_string(), slot);
    }

    fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        self.slots.read()
            .get(key)
            .filter(|slot| slot.live(now))
            .map(|slot| slot.entry)
    }

    fn remove(&self, key: &str) -> bool {
        let now = Instant::now();
        self.slots.write()
            .remove(key)
            .filter(|slot| slot.live(now))
            .is_some()
    }

    fn get_all(&self) -> Vec<(String, CacheEntry)> {
        let now = Instant::now();
        self.slots.read()
            .iter()
            .filter(|(_, slot)| slot.live(now))
            .map(|(key, slot)| (key.clone(), slot.entry))
            .collect()
    }

    fn get_all_keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.slots.read()
            .iter()
            .filter(|(_, slot)| slot.live(now))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use crate::cache::{
        CacheEntry,
        MemoryTaskCache,
        TaskCache,
    };

    fn entry(task_id: i64, pid: i64) -> CacheEntry {
        CacheEntry { task_id, pid }
    }

    #[test]
    fn set_get_remove() {
        let cache = MemoryTaskCache::new();
        assert_eq!(cache.get("smoke-1.jtl"), None);

        cache.set("smoke-1.jtl", entry(1, 100), None);
        assert_eq!(cache.get("smoke-1.jtl"), Some(entry(1, 100)));

        // last set wins
        cache.set("smoke-1.jtl", entry(1, 200), None);
        assert_eq!(cache.get("smoke-1.jtl"), Some(entry(1, 200)));

        assert!(cache.remove("smoke-1.jtl"));
        assert!(!cache.remove("smoke-1.jtl"));
        assert_eq!(cache.get("smoke-1.jtl"), None);
    }

    #[test]
    fn snapshot_enumeration() {
        let cache = MemoryTaskCache::new();
        cache.set("a.jtl", entry(1, 100), None);
        cache.set("b.jtl", entry(2, 101), None);

        let mut keys = cache.get_all_keys();
        keys.sort();
        assert_eq!(keys, vec!["a.jtl", "b.jtl"]);

        // mutating after the snapshot does not affect it
        let snapshot = cache.get_all();
        cache.remove("a.jtl");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(cache.get_all().len(), 1);
    }

    #[test]
    fn ttl_expiry() {
        let cache = MemoryTaskCache::new();
        cache.set("fast.jtl", entry(1, 100), Some(Duration::from_millis(10)));
        cache.set("slow.jtl", entry(2, 101), Some(Duration::from_secs(3600)));
        assert_eq!(cache.get("fast.jtl"), Some(entry(1, 100)));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("fast.jtl"), None);
        assert_eq!(cache.get("slow.jtl"), Some(entry(2, 101)));
        assert_eq!(cache.get_all_keys(), vec!["slow.jtl"]);

        // the expired slot is still resident until purged
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn expired_remove_reports_absent() {
        let cache = MemoryTaskCache::new();
        cache.set("gone.jtl", entry(1, 100), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(10));
        assert!(!cache.remove("gone.jtl"));
    }
}
