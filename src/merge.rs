//! Folds processes that share an executable with their parent chain into a
//! single record.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};

use crate::models::ProcessInfo;

/// Walks PPID links upward while the parent is present and runs the same
/// non-empty executable. Returns the PID of the topmost such ancestor.
fn find_merge_root(pid: u32, by_pid: &HashMap<u32, &ProcessInfo>) -> u32 {
    let mut current = pid;
    let mut seen = HashSet::new();
    seen.insert(current);

    loop {
        let node = match by_pid.get(&current) {
            Some(p) => p,
            None => return current,
        };
        let parent = match by_pid.get(&node.ppid) {
            Some(p) => p,
            None => return current,
        };
        if parent.executable_path.is_empty()
            || node.executable_path.is_empty()
            || parent.executable_path != node.executable_path
        {
            return current;
        }
        if !seen.insert(parent.pid) {
            return current;
        }
        current = parent.pid;
    }
}

/// Collapses descendants into their shared-executable root.
///
/// Each non-root member adds its CPU and memory figures to a copy of its root
/// and bumps the root's `child_count`; non-root members are dropped. Roots
/// keep the order of their first appearance.
pub fn merge_by_executable(processes: Vec<ProcessInfo>) -> Vec<ProcessInfo> {
    let by_pid: HashMap<u32, &ProcessInfo> = processes.iter().map(|p| (p.pid, p)).collect();

    let mut order: Vec<u32> = Vec::new();
    let mut roots: HashMap<u32, ProcessInfo> = HashMap::new();

    for p in &processes {
        let root_pid = find_merge_root(p.pid, &by_pid);
        let root = roots.entry(root_pid).or_insert_with(|| {
            order.push(root_pid);
            let mut clone = by_pid
                .get(&root_pid)
                .map(|r| (*r).clone())
                .unwrap_or_else(|| p.clone());
            clone.child_count = 0;
            clone
        });

        if p.pid != root_pid {
            root.cpu += p.cpu;
            root.memory_kb += p.memory_kb;
            root.memory_percent += p.memory_percent;
            root.rss_kb += p.rss_kb;
            root.rss_percent += p.rss_percent;
            root.pss_kb += p.pss_kb;
            root.pss_percent += p.pss_percent;
            root.child_count += 1;
        }
    }

    order
        .into_iter()
        .filter_map(|pid| roots.remove(&pid))
        .collect()
}
