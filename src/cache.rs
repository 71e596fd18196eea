//! Cache of per-process attributes that do not change during a process's
//! lifetime.
//!
//! Entries are invalidated by liveness, not by time: every sampling pass
//! prunes PIDs that are no longer in the live set.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::sync::RwLock;
use tracing::debug;

use crate::provider::ProcessHandle;

/// Attributes read once per PID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticProcessInfo {
    pub name: String,
    pub cmdline: String,
    pub ppid: u32,
    pub username: String,
    pub exe_path: String,
}

impl StaticProcessInfo {
    /// Reads every attribute; a failing accessor leaves its field empty.
    pub fn read(handle: &dyn ProcessHandle) -> Self {
        Self {
            name: handle.name().unwrap_or_default(),
            cmdline: handle.cmdline().unwrap_or_default(),
            ppid: handle.ppid().unwrap_or_default(),
            username: handle.username().unwrap_or_default(),
            exe_path: handle.exe().unwrap_or_default(),
        }
    }
}

#[derive(Default)]
pub struct StaticInfoCache {
    entries: RwLock<HashMap<u32, StaticProcessInfo>>,
}

impl StaticInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached attributes for `handle`, reading them on a miss.
    ///
    /// Two workers racing on the same PID both read, but only the first
    /// insert is kept and the loser returns the stored value.
    pub fn get(&self, handle: &dyn ProcessHandle) -> StaticProcessInfo {
        let pid = handle.pid();
        {
            let entries = match self.entries.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(cached) = entries.get(&pid) {
                return cached.clone();
            }
        }

        let info = StaticProcessInfo::read(handle);

        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.entry(pid).or_insert(info).clone()
    }

    /// Drops entries whose PID is not in `live`.
    pub fn prune(&self, live: &[u32]) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.is_empty() {
            return;
        }
        let active: HashSet<u32> = live.iter().copied().collect();
        let before = entries.len();
        entries.retain(|pid, _| active.contains(pid));
        debug!(
            "Pruned {} static cache entries ({} remain)",
            before - entries.len(),
            entries.len()
        );
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(&pid))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::{FakeHandle, FakeProcess};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn handle(pid: u32) -> FakeHandle {
        FakeHandle::new(FakeProcess::new(pid, 1, &format!("p{}", pid), "/bin/p"))
    }

    #[test]
    fn test_second_get_is_served_from_cache() {
        let cache = StaticInfoCache::new();
        let h = handle(10);

        let first = cache.get(&h);
        let second = cache.get(&h);

        assert_eq!(first, second);
        assert_eq!(first.name, "p10");
        assert_eq!(first.exe_path, "/bin/p");
        assert_eq!(h.name_reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_field_is_empty() {
        let cache = StaticInfoCache::new();
        let mut p = FakeProcess::new(5, 1, "svc", "/usr/sbin/svc");
        p.exe_fails = true;
        let info = cache.get(&FakeHandle::new(p));
        assert_eq!(info.name, "svc");
        assert!(info.exe_path.is_empty());
    }

    #[test]
    fn test_prune_removes_exited_pids() {
        let cache = StaticInfoCache::new();
        for pid in [1, 2, 3] {
            cache.get(&handle(pid));
        }
        assert_eq!(cache.len(), 3);

        cache.prune(&[1, 3]);

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_population_keeps_one_value() {
        let cache = Arc::new(StaticInfoCache::new());
        let h = Arc::new(handle(77));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let h = h.clone();
                std::thread::spawn(move || cache.get(h.as_ref()))
            })
            .collect();
        let results: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.len(), 1);
    }
}
