//! Response and snapshot types returned by the engine.
//!
//! Everything here is serializable so the API layer and the CLI can hand the
//! values straight to `serde_json`/`serde_yaml`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sort key for process listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Cpu,
    Memory,
    Name,
    Pid,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(SortBy::Cpu),
            "memory" | "mem" => Ok(SortBy::Memory),
            "name" => Ok(SortBy::Name),
            "pid" => Ok(SortBy::Pid),
            other => Err(format!(
                "invalid sort key '{}', expected cpu, memory, name or pid",
                other
            )),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortBy::Cpu => "cpu",
            SortBy::Memory => "memory",
            SortBy::Name => "name",
            SortBy::Pid => "pid",
        };
        f.write_str(s)
    }
}

/// Which figure `memory_kb`/`memory_percent` were taken from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCalculation {
    #[default]
    Rss,
    PssDirty,
}

/// One process as seen by a single sampling pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub username: String,
    pub command: String,
    pub full_command: String,
    pub executable_path: String,
    pub cpu: f64,
    /// Cumulative user+system CPU seconds at sample time.
    pub cpu_ticks: f64,
    pub memory_kb: u64,
    pub memory_percent: f32,
    pub memory_calculation: MemoryCalculation,
    pub rss_kb: u64,
    pub rss_percent: f32,
    pub pss_kb: u64,
    pub pss_percent: f32,
    /// Number of processes folded into this one by the merge reducer.
    pub child_count: u32,
}

impl ProcessInfo {
    /// Stand-in for a process whose read faulted mid-sample.
    pub fn placeholder(pid: u32) -> Self {
        Self {
            pid,
            command: format!("[pid {}]", pid),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessListResponse {
    pub processes: Vec<ProcessInfo>,
    pub cursor: String,
    #[serde(skip)]
    pub stats: SampleStats,
}

/// Bookkeeping for one sampling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleStats {
    pub sampled: usize,
    pub faulted: usize,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRateInfo {
    pub interface: String,
    pub rx_rate: f64,
    pub tx_rate: f64,
    pub rx_total: u64,
    pub tx_total: u64,
}

impl NetworkRateInfo {
    pub fn current_rate(&self) -> f64 {
        self.rx_rate + self.tx_rate
    }

    pub fn lifetime_total(&self) -> u64 {
        self.rx_total.saturating_add(self.tx_total)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRateResponse {
    pub interfaces: Vec<NetworkRateInfo>,
    pub cursor: String,
}

/// Lifetime counters for one usable interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub name: String,
    pub rx: u64,
    pub tx: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskRateInfo {
    pub device: String,
    pub read_rate: f64,
    pub write_rate: f64,
    pub read_total: u64,
    pub write_total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskRateResponse {
    pub disks: Vec<DiskRateInfo>,
    pub cursor: String,
}

impl DiskRateResponse {
    /// Folds every device into a single "total" sample.
    pub fn total(&self) -> DiskRateInfo {
        self.disks.iter().fold(
            DiskRateInfo {
                device: "total".to_string(),
                read_rate: 0.0,
                write_rate: 0.0,
                read_total: 0,
                write_total: 0,
            },
            |mut acc, d| {
                acc.read_rate += d.read_rate;
                acc.write_rate += d.write_rate;
                acc.read_total = acc.read_total.saturating_add(d.read_total);
                acc.write_total = acc.write_total.saturating_add(d.write_total);
                acc
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuInfo {
    pub count: usize,
    /// Busy percent across all cores since the cursor sample.
    pub usage: f64,
    pub core_usage: Vec<f64>,
    pub cursor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_kb: u64,
    pub available_kb: u64,
    pub used_kb: u64,
    pub used_percent: f64,
    pub free_kb: u64,
    pub buffers_kb: u64,
    pub cached_kb: u64,
    pub swap_total_kb: u64,
    pub swap_free_kb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub load_avg: String,
    pub processes: usize,
    pub threads: u64,
    pub boot_time: String,
}

/// One temperature sensor, in degrees Celsius. `high` and `critical` are 0
/// when the sensor reports no threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureInfo {
    pub name: String,
    pub temperature: f64,
    pub high: f64,
    pub critical: f64,
}

/// Space usage of one mounted filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskMountInfo {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub total_kb: u64,
    pub used_kb: u64,
    pub available_kb: u64,
    /// Used share of the space visible to unprivileged users, as `df` shows it.
    pub used_percent: f64,
}

/// Result of an all-domains pass. A domain that could not be read is `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu: Option<CpuInfo>,
    pub memory: Option<MemoryInfo>,
    pub network: Option<Vec<NetworkInfo>>,
    pub disk: Option<DiskRateResponse>,
    pub disk_mounts: Option<Vec<DiskMountInfo>>,
    pub temperatures: Option<Vec<TemperatureInfo>>,
    pub processes: Option<ProcessListResponse>,
    pub system: Option<SystemInfo>,
}
