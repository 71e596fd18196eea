//! Rate arithmetic between a cursor sample and a current sample.
//!
//! Every function here is pure. Degenerate input (unset prior, elapsed time
//! that is zero or negative, counters that went backwards) yields 0 instead of
//! a negative, infinite or NaN rate.

use std::collections::BTreeMap;

use crate::cursor::{DiskCounters, NetCounters, ProcessCursorEntry};
use crate::models::{DiskRateInfo, NetworkRateInfo};
use crate::provider::CpuTicks;

/// CPU percent of one core used by a process since `prior`, clamped to
/// `[0, 100]`.
pub fn process_cpu_percent(prior: &ProcessCursorEntry, current_ticks: f64, now_ms: i64) -> f64 {
    raw_cpu_percent(prior, current_ticks, now_ms)
        .map(|p| p.clamp(0.0, 100.0))
        .unwrap_or(0.0)
}

/// Like [`process_cpu_percent`] but divided by the logical CPU count, so a
/// process saturating every core reads 100.
pub fn normalized_process_cpu_percent(
    prior: &ProcessCursorEntry,
    current_ticks: f64,
    now_ms: i64,
    cpu_count: usize,
) -> f64 {
    let cores = cpu_count.max(1) as f64;
    raw_cpu_percent(prior, current_ticks, now_ms)
        .map(|p| (p / cores).clamp(0.0, 100.0))
        .unwrap_or(0.0)
}

fn raw_cpu_percent(prior: &ProcessCursorEntry, current_ticks: f64, now_ms: i64) -> Option<f64> {
    if prior.timestamp == 0 || current_ticks <= prior.ticks {
        return None;
    }
    let wall = wall_seconds(prior.timestamp, now_ms);
    if wall <= 0.0 {
        return None;
    }
    Some((current_ticks - prior.ticks) / wall * 100.0)
}

/// Elapsed seconds between two unix-millisecond timestamps; negative under
/// clock skew, 0 when the difference does not fit in an `i64`.
pub fn wall_seconds(prior_ms: i64, now_ms: i64) -> f64 {
    now_ms
        .checked_sub(prior_ms)
        .map_or(0.0, |ms| ms as f64 / 1000.0)
}

/// Bytes per second between two counter readings.
pub fn byte_rate(prior: u64, current: u64, wall_secs: f64) -> f64 {
    if wall_secs <= 0.0 {
        return 0.0;
    }
    current.saturating_sub(prior) as f64 / wall_secs
}

/// Per-interface rates. Interfaces missing from `prior` (or every interface
/// when the elapsed time is not positive) report a zero rate with their
/// totals filled in.
pub fn network_rates(
    prior: &BTreeMap<String, NetCounters>,
    current: &BTreeMap<String, NetCounters>,
    wall_secs: f64,
) -> Vec<NetworkRateInfo> {
    current
        .iter()
        .map(|(name, cur)| {
            let (rx_rate, tx_rate) = match prior.get(name) {
                Some(prev) => (
                    byte_rate(prev.bytes_recv, cur.bytes_recv, wall_secs),
                    byte_rate(prev.bytes_sent, cur.bytes_sent, wall_secs),
                ),
                None => (0.0, 0.0),
            };
            NetworkRateInfo {
                interface: name.clone(),
                rx_rate,
                tx_rate,
                rx_total: cur.bytes_recv,
                tx_total: cur.bytes_sent,
            }
        })
        .collect()
}

/// Per-device rates, same policy as [`network_rates`].
pub fn disk_rates(
    prior: &BTreeMap<String, DiskCounters>,
    current: &BTreeMap<String, DiskCounters>,
    wall_secs: f64,
) -> Vec<DiskRateInfo> {
    current
        .iter()
        .map(|(name, cur)| {
            let (read_rate, write_rate) = match prior.get(name) {
                Some(prev) => (
                    byte_rate(prev.read_bytes, cur.read_bytes, wall_secs),
                    byte_rate(prev.write_bytes, cur.write_bytes, wall_secs),
                ),
                None => (0.0, 0.0),
            };
            DiskRateInfo {
                device: name.clone(),
                read_rate,
                write_rate,
                read_total: cur.read_bytes,
                write_total: cur.write_bytes,
            }
        })
        .collect()
}

/// Busy share of host CPU time between two tick readings, in percent.
pub fn cpu_usage_percent(prior: &CpuTicks, current: &CpuTicks) -> f64 {
    let delta_total = current.total().saturating_sub(prior.total());
    if delta_total == 0 {
        return 0.0;
    }
    let delta_idle = current.idle_total().saturating_sub(prior.idle_total());
    let busy = delta_total.saturating_sub(delta_idle);
    (busy as f64 / delta_total as f64 * 100.0).clamp(0.0, 100.0)
}
