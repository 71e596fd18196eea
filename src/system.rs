//! Host-wide aggregates: load, process and thread counts, boot time, plus
//! the memory, filesystem and sensor views derived from raw counters.
//!
//! The thread count has to visit every live process, so it is cached for a
//! short window by [`ThreadCountTracker`] instead of being recomputed on each
//! request.

use chrono::{Local, TimeZone};
use std::io;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::{DiskMountInfo, MemoryInfo, SystemInfo, TemperatureInfo};
use crate::provider::{FsUsage, LoadAverage, Provider, SensorTemperature, VirtualMemory};

pub const DEFAULT_THREAD_CACHE_WINDOW: Duration = Duration::from_secs(10);

const BOOT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy)]
struct CachedCount {
    value: u64,
    computed_at: Instant,
}

/// Time-windowed cache of the total thread count.
pub struct ThreadCountTracker {
    window: Duration,
    cached: Mutex<Option<CachedCount>>,
}

impl ThreadCountTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached count while it is younger than the window,
    /// otherwise recomputes it with `compute`.
    pub fn get_or_compute<F>(&self, compute: F) -> u64
    where
        F: FnOnce() -> u64,
    {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entry) = *cached {
            if entry.computed_at.elapsed() < self.window {
                return entry.value;
            }
        }
        let value = compute();
        *cached = Some(CachedCount {
            value,
            computed_at: Instant::now(),
        });
        value
    }
}

impl Default for ThreadCountTracker {
    fn default() -> Self {
        Self::new(DEFAULT_THREAD_CACHE_WINDOW)
    }
}

/// Sums the thread counts of `pids`, skipping processes that vanished.
pub fn count_threads(provider: &dyn Provider, pids: &[u32]) -> u64 {
    pids.iter()
        .filter_map(|&pid| provider.process(pid).ok())
        .filter_map(|handle| handle.num_threads().ok())
        .sum()
}

pub fn format_load_average(load: &LoadAverage) -> String {
    format!(
        "{:.2} {:.2} {:.2}",
        load.one_min, load.five_min, load.fifteen_min
    )
}

/// Formats a unix timestamp in local time; empty when out of range.
pub fn format_boot_time(epoch_secs: u64) -> String {
    i64::try_from(epoch_secs)
        .ok()
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map(|t| t.format(BOOT_TIME_FORMAT).to_string())
        .unwrap_or_default()
}

/// Builds the host summary. Only a failure to list processes fails the
/// call; load average and boot time degrade to zero values.
pub fn system_info(provider: &dyn Provider, threads: &ThreadCountTracker) -> io::Result<SystemInfo> {
    let pids = provider.pids()?;

    let load = provider.load_average().unwrap_or_else(|e| {
        debug!("Load average unavailable: {}", e);
        LoadAverage::default()
    });
    let boot_time = provider.boot_time().unwrap_or_else(|e| {
        debug!("Boot time unavailable: {}", e);
        0
    });

    let thread_count = threads.get_or_compute(|| count_threads(provider, &pids));

    Ok(SystemInfo {
        load_avg: format_load_average(&load),
        processes: pids.len(),
        threads: thread_count,
        boot_time: format_boot_time(boot_time),
    })
}

/// Derives used memory and its percentage from raw counters.
pub fn memory_info(mem: &VirtualMemory) -> MemoryInfo {
    let used_kb = mem.total_kb.saturating_sub(mem.available_kb);
    let used_percent = if mem.total_kb == 0 {
        0.0
    } else {
        used_kb as f64 / mem.total_kb as f64 * 100.0
    };
    MemoryInfo {
        total_kb: mem.total_kb,
        available_kb: mem.available_kb,
        used_kb,
        used_percent,
        free_kb: mem.free_kb,
        buffers_kb: mem.buffers_kb,
        cached_kb: mem.cached_kb,
        swap_total_kb: mem.swap_total_kb,
        swap_free_kb: mem.swap_free_kb,
    }
}

/// Converts byte counts to KB. Used space is `total - free`; the percentage
/// is taken over `used + available` so root-reserved blocks do not count as
/// free.
pub fn mount_info(usage: &FsUsage) -> DiskMountInfo {
    let used = usage.total.saturating_sub(usage.free);
    let visible = used.saturating_add(usage.available);
    let used_percent = if visible == 0 {
        0.0
    } else {
        used as f64 / visible as f64 * 100.0
    };
    DiskMountInfo {
        device: usage.device.clone(),
        mount_point: usage.mount_point.clone(),
        fs_type: usage.fs_type.clone(),
        total_kb: usage.total / 1024,
        used_kb: used / 1024,
        available_kb: usage.available / 1024,
        used_percent,
    }
}

pub fn temperature_info(sensor: &SensorTemperature) -> TemperatureInfo {
    TemperatureInfo {
        name: sensor.key.clone(),
        temperature: sensor.current,
        high: sensor.high,
        critical: sensor.critical,
    }
}
