//! OS-abstraction layer.
//!
//! The engine never touches `/proc` directly; it reads raw counters through
//! [`Provider`] and [`ProcessHandle`] so the Linux implementation can be
//! replaced by deterministic doubles in tests. Every accessor is a
//! point-in-time read and may fail independently of its siblings.

use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;

pub mod linux;

#[cfg(test)]
pub mod fake;

pub use linux::LinuxProvider;

/// User and system CPU time of one process, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user: f64,
    pub system: f64,
}

impl CpuTimes {
    pub fn total(&self) -> f64 {
        self.user + self.system
    }
}

/// Resident memory of one process, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessMemory {
    pub rss: u64,
}

/// Host CPU tick counters for one CPU line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuTicks {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTicks {
    /// Sum of every counter, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        [
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
        ]
        .iter()
        .fold(self.user, |acc, v| acc.saturating_add(*v))
    }

    /// Idle plus time spent waiting on I/O.
    pub fn idle_total(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }
}

/// Host memory counters, in KB.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VirtualMemory {
    pub total_kb: u64,
    pub available_kb: u64,
    pub free_kb: u64,
    pub buffers_kb: u64,
    pub cached_kb: u64,
    pub swap_total_kb: u64,
    pub swap_free_kb: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAverage {
    pub one_min: f64,
    pub five_min: f64,
    pub fifteen_min: f64,
}

/// Lifetime byte counters for one network interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetIoCounters {
    pub name: String,
    pub bytes_recv: u64,
    pub bytes_sent: u64,
}

/// Interface metadata used to filter out loopback and down links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceMeta {
    pub name: String,
    pub up: bool,
    pub loopback: bool,
}

/// Lifetime byte counters for one block device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskIoCounters {
    pub name: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// One hardware temperature channel, in degrees Celsius. Thresholds the
/// driver does not expose are 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorTemperature {
    pub key: String,
    pub current: f64,
    pub high: f64,
    pub critical: f64,
}

/// Capacity of one mounted block-device filesystem, in bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FsUsage {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub total: u64,
    pub free: u64,
    /// Free space available to unprivileged users.
    pub available: u64,
}

/// Accessors for one live process.
///
/// Implementations may panic when the process exits mid-read; the sampler
/// isolates each handle so a panic costs only that process's record.
pub trait ProcessHandle: Send + Sync {
    fn pid(&self) -> u32;
    fn name(&self) -> io::Result<String>;
    fn cmdline(&self) -> io::Result<String>;
    fn ppid(&self) -> io::Result<u32>;
    fn username(&self) -> io::Result<String>;
    fn exe(&self) -> io::Result<String>;
    fn memory_info(&self) -> io::Result<ProcessMemory>;
    fn times(&self) -> io::Result<CpuTimes>;
    /// CPU percent of one core since the previous call on this handle.
    /// The first call only records a baseline and returns 0. Providers hand
    /// out fresh handles on every pass, so a cold-start read on a handle that
    /// was not primed in the same pass always returns 0.
    fn cpu_percent(&self) -> io::Result<f64>;
    fn num_threads(&self) -> io::Result<u64>;
    /// Dirty proportional share in KB; unsupported platforms return an error.
    fn pss_dirty_kb(&self) -> io::Result<u64>;
}

pub type SharedHandle = Arc<dyn ProcessHandle>;

/// Host-level capability interface.
pub trait Provider: Send + Sync {
    fn processes(&self) -> io::Result<Vec<SharedHandle>>;
    fn pids(&self) -> io::Result<Vec<u32>>;
    fn process(&self, pid: u32) -> io::Result<SharedHandle>;
    /// Logical CPU count, never below 1.
    fn cpu_count(&self) -> usize;
    /// Aggregate line first, then one entry per core.
    fn cpu_times(&self) -> io::Result<(CpuTicks, Vec<CpuTicks>)>;
    fn virtual_memory(&self) -> io::Result<VirtualMemory>;
    fn load_average(&self) -> io::Result<LoadAverage>;
    /// Seconds since the unix epoch.
    fn boot_time(&self) -> io::Result<u64>;
    fn net_io_counters(&self) -> io::Result<Vec<NetIoCounters>>;
    fn interfaces(&self) -> io::Result<Vec<InterfaceMeta>>;
    fn disk_io_counters(&self) -> io::Result<Vec<DiskIoCounters>>;
    /// Errors when the platform exposes no sensor tree at all; a tree
    /// without temperature channels yields an empty list.
    fn temperatures(&self) -> io::Result<Vec<SensorTemperature>>;
    /// Filesystems backed by a block device. Mounts whose usage cannot be
    /// read are left out.
    fn disk_usage(&self) -> io::Result<Vec<FsUsage>>;
}
