//! The metrics engine.
//!
//! [`Engine`] owns the only state that survives between calls: the sampler's
//! static info cache and the thread-count window. Everything rate-related
//! comes in and goes out as cursor tokens.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::cursor::{
    self, CpuCursor, DiskCounters, DiskRateCursor, NetCounters, NetworkRateCursor,
    ProcessCursorEntry,
};
use crate::error::Result;
use crate::interface::{interface_index, is_usable_interface};
use crate::merge::merge_by_executable;
use crate::models::{
    CpuInfo, DiskMountInfo, DiskRateResponse, MemoryInfo, NetworkInfo, NetworkRateResponse,
    ProcessInfo, ProcessListResponse, SortBy, SystemInfo, SystemMetrics, TemperatureInfo,
};
use crate::provider::{CpuTicks, NetIoCounters, Provider};
use crate::rates;
use crate::sampler::{
    SampleContext, Sampler, DEFAULT_PRIME_INTERVAL, DEFAULT_PSS_THRESHOLD_KB, MAX_WORKERS,
};
use crate::system::{self, ThreadCountTracker, DEFAULT_THREAD_CACHE_WINDOW};

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sampler workers; `None` means one per CPU up to the cap.
    pub max_workers: Option<usize>,
    /// Sleep after priming CPU baselines on a cold start.
    pub prime_interval: Duration,
    pub thread_cache_window: Duration,
    pub pss_threshold_kb: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            prime_interval: DEFAULT_PRIME_INTERVAL,
            thread_cache_window: DEFAULT_THREAD_CACHE_WINDOW,
            pss_threshold_kb: DEFAULT_PSS_THRESHOLD_KB,
        }
    }
}

/// Parameters of one process listing.
#[derive(Debug, Clone)]
pub struct ProcessQuery {
    pub sort_by: SortBy,
    /// Maximum records returned; 0 means unlimited.
    pub limit: usize,
    pub enable_cpu: bool,
    pub cursor: Option<String>,
    pub merge_children: bool,
}

impl Default for ProcessQuery {
    fn default() -> Self {
        Self {
            sort_by: SortBy::default(),
            limit: 0,
            enable_cpu: true,
            cursor: None,
            merge_children: false,
        }
    }
}

/// Parameters of an all-domains pass.
#[derive(Debug, Clone, Default)]
pub struct MetricsQuery {
    pub processes: ProcessQuery,
    pub cpu_cursor: Option<String>,
    pub disk_cursor: Option<String>,
}

fn sort_processes(processes: &mut [ProcessInfo], sort_by: SortBy) {
    match sort_by {
        SortBy::Cpu => {
            processes.sort_by(|a, b| b.cpu.partial_cmp(&a.cpu).unwrap_or(Ordering::Equal))
        }
        SortBy::Memory => processes.sort_by(|a, b| {
            b.memory_percent
                .partial_cmp(&a.memory_percent)
                .unwrap_or(Ordering::Equal)
        }),
        SortBy::Name => processes.sort_by(|a, b| a.command.cmp(&b.command)),
        SortBy::Pid => processes.sort_by_key(|p| p.pid),
    }
}

/// Elapsed seconds since a cursor was issued; 0 for a cold cursor.
fn cursor_age_secs(cursor_ts: i64, now_ms: i64) -> f64 {
    if cursor_ts == 0 {
        return 0.0;
    }
    rates::wall_seconds(cursor_ts, now_ms)
}

pub struct Engine {
    provider: Arc<dyn Provider>,
    sampler: Sampler,
    threads: ThreadCountTracker,
}

impl Engine {
    pub fn new(provider: Arc<dyn Provider>, config: EngineConfig) -> Result<Self> {
        let workers = config
            .max_workers
            .unwrap_or_else(|| provider.cpu_count())
            .min(MAX_WORKERS);
        let sampler = Sampler::new(workers, config.prime_interval, config.pss_threshold_kb)?;
        Ok(Self {
            provider,
            sampler,
            threads: ThreadCountTracker::new(config.thread_cache_window),
        })
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Samples every live process, then merges, sorts and truncates the
    /// list. The returned cursor covers exactly the returned records.
    pub fn processes(&self, query: &ProcessQuery) -> Result<ProcessListResponse> {
        self.processes_at(query, now_ms())
    }

    fn processes_at(&self, query: &ProcessQuery, now_ms: i64) -> Result<ProcessListResponse> {
        let handles = self.provider.processes()?;
        let total_memory_kb = match self.provider.virtual_memory() {
            Ok(mem) => mem.total_kb,
            Err(e) => {
                debug!("Memory total unavailable, percentages will be zero: {}", e);
                0
            }
        };
        let prior = cursor::decode_process_cursor(query.cursor.as_deref());

        let ctx = SampleContext {
            cursor: &prior,
            enable_cpu: query.enable_cpu,
            now_ms,
            cpu_count: self.provider.cpu_count(),
            total_memory_kb,
        };
        let (mut processes, stats) = self.sampler.sample(&handles, &ctx);

        if query.merge_children {
            processes = merge_by_executable(processes);
        }
        sort_processes(&mut processes, query.sort_by);
        if query.limit > 0 {
            processes.truncate(query.limit);
        }

        let entries: Vec<ProcessCursorEntry> = processes
            .iter()
            .map(|p| ProcessCursorEntry {
                pid: p.pid,
                ticks: p.cpu_ticks,
                timestamp: now_ms,
            })
            .collect();

        Ok(ProcessListResponse {
            processes,
            cursor: cursor::encode(&entries)?,
            stats,
        })
    }

    fn usable_net_counters(&self) -> Result<Vec<NetIoCounters>> {
        let counters = self.provider.net_io_counters()?;
        let index = match self.provider.interfaces() {
            Ok(ifaces) => interface_index(ifaces),
            Err(e) => {
                debug!("Interface metadata unavailable: {}", e);
                Default::default()
            }
        };
        Ok(counters
            .into_iter()
            .filter(|c| is_usable_interface(&c.name, &index))
            .collect())
    }

    /// Per-interface byte rates since `cursor`.
    pub fn network_rates(&self, cursor: Option<&str>) -> Result<NetworkRateResponse> {
        self.network_rates_at(cursor, now_ms())
    }

    fn network_rates_at(&self, cursor: Option<&str>, now_ms: i64) -> Result<NetworkRateResponse> {
        let prior: NetworkRateCursor = cursor::decode_or_default(cursor);
        let current: BTreeMap<String, NetCounters> = self
            .usable_net_counters()?
            .into_iter()
            .map(|c| {
                (
                    c.name,
                    NetCounters {
                        bytes_recv: c.bytes_recv,
                        bytes_sent: c.bytes_sent,
                    },
                )
            })
            .collect();

        let wall = cursor_age_secs(prior.timestamp, now_ms);
        let interfaces = rates::network_rates(&prior.iostats, &current, wall);
        let next = NetworkRateCursor {
            timestamp: now_ms,
            iostats: current,
        };

        Ok(NetworkRateResponse {
            interfaces,
            cursor: cursor::encode(&next)?,
        })
    }

    /// Per-device byte rates since `cursor`.
    pub fn disk_rates(&self, cursor: Option<&str>) -> Result<DiskRateResponse> {
        self.disk_rates_at(cursor, now_ms())
    }

    fn disk_rates_at(&self, cursor: Option<&str>, now_ms: i64) -> Result<DiskRateResponse> {
        let prior: DiskRateCursor = cursor::decode_or_default(cursor);
        let current: BTreeMap<String, DiskCounters> = self
            .provider
            .disk_io_counters()?
            .into_iter()
            .map(|d| {
                (
                    d.name,
                    DiskCounters {
                        read_bytes: d.read_bytes,
                        write_bytes: d.write_bytes,
                    },
                )
            })
            .collect();

        let wall = cursor_age_secs(prior.timestamp, now_ms);
        let disks = rates::disk_rates(&prior.iostats, &current, wall);
        let next = DiskRateCursor {
            timestamp: now_ms,
            iostats: current,
        };

        Ok(DiskRateResponse {
            disks,
            cursor: cursor::encode(&next)?,
        })
    }

    /// Host CPU usage since `cursor`. Without a usable cursor the figures
    /// are averages since boot.
    pub fn cpu_info(&self, cursor: Option<&str>) -> Result<CpuInfo> {
        self.cpu_info_at(cursor, now_ms())
    }

    fn cpu_info_at(&self, cursor: Option<&str>, now_ms: i64) -> Result<CpuInfo> {
        let prior: CpuCursor = cursor::decode_or_default(cursor);
        let (total, cores) = self.provider.cpu_times()?;

        let usage = rates::cpu_usage_percent(&prior.total, &total);
        let core_usage = cores
            .iter()
            .enumerate()
            .map(|(i, core)| {
                let before = prior.cores.get(i).copied().unwrap_or_else(CpuTicks::default);
                rates::cpu_usage_percent(&before, core)
            })
            .collect();

        let next = CpuCursor {
            timestamp: now_ms,
            total,
            cores,
        };

        Ok(CpuInfo {
            count: self.provider.cpu_count(),
            usage,
            core_usage,
            cursor: cursor::encode(&next)?,
        })
    }

    /// Lifetime counters of every usable interface.
    pub fn network_info(&self) -> Result<Vec<NetworkInfo>> {
        Ok(self
            .usable_net_counters()?
            .into_iter()
            .map(|c| NetworkInfo {
                name: c.name,
                rx: c.bytes_recv,
                tx: c.bytes_sent,
            })
            .collect())
    }

    pub fn memory_info(&self) -> Result<MemoryInfo> {
        Ok(system::memory_info(&self.provider.virtual_memory()?))
    }

    pub fn system_info(&self) -> Result<SystemInfo> {
        Ok(system::system_info(self.provider.as_ref(), &self.threads)?)
    }

    /// Space usage of every block-device mount.
    pub fn disk_mounts(&self) -> Result<Vec<DiskMountInfo>> {
        Ok(self
            .provider
            .disk_usage()?
            .iter()
            .map(system::mount_info)
            .collect())
    }

    /// Every temperature sensor, ordered by name.
    pub fn temperatures(&self) -> Result<Vec<TemperatureInfo>> {
        let mut temps: Vec<TemperatureInfo> = self
            .provider
            .temperatures()?
            .iter()
            .map(system::temperature_info)
            .collect();
        temps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(temps)
    }

    /// Collects every domain. A failing domain is logged and left `None`.
    pub fn all_metrics(&self, query: &MetricsQuery) -> SystemMetrics {
        fn domain<T>(name: &str, result: Result<T>) -> Option<T> {
            match result {
                Ok(value) => Some(value),
                Err(e) => {
                    error!("Failed to get {} info: {}", name, e);
                    None
                }
            }
        }

        SystemMetrics {
            cpu: domain("CPU", self.cpu_info(query.cpu_cursor.as_deref())),
            memory: domain("memory", self.memory_info()),
            network: domain("network", self.network_info()),
            disk: domain("disk", self.disk_rates(query.disk_cursor.as_deref())),
            disk_mounts: domain("disk mount", self.disk_mounts()),
            temperatures: domain("temperature", self.temperatures()),
            processes: domain("process", self.processes(&query.processes)),
            system: domain("system", self.system_info()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::MemoryCalculation;
    use crate::provider::fake::{FakeProcess, FakeProvider};
    use crate::provider::{DiskIoCounters, FsUsage, InterfaceMeta, SensorTemperature};
    use std::io;

    const T0: i64 = 1_700_000_000_000;

    fn config() -> EngineConfig {
        EngineConfig {
            max_workers: Some(2),
            prime_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    fn engine(fake: &Arc<FakeProvider>) -> Engine {
        Engine::new(fake.clone(), config()).unwrap()
    }

    fn net(name: &str, rx: u64, tx: u64) -> NetIoCounters {
        NetIoCounters {
            name: name.to_string(),
            bytes_recv: rx,
            bytes_sent: tx,
        }
    }

    fn meta(name: &str, up: bool, loopback: bool) -> InterfaceMeta {
        InterfaceMeta {
            name: name.to_string(),
            up,
            loopback,
        }
    }

    fn processes() -> Vec<FakeProcess> {
        vec![
            FakeProcess::new(1, 0, "init", "/sbin/init").rss_kb(4_096).cpu_seconds(1.0),
            FakeProcess::new(10, 1, "chrome", "/opt/chrome").rss_kb(300_000).cpu_seconds(10.0),
            FakeProcess::new(11, 10, "chrome", "/opt/chrome").rss_kb(200_000).cpu_seconds(5.0),
            FakeProcess::new(12, 11, "chrome", "/opt/chrome").rss_kb(100_000).cpu_seconds(2.0),
            FakeProcess::new(20, 1, "bash", "/bin/bash").rss_kb(8_192).cpu_seconds(0.5),
        ]
    }

    #[test]
    fn test_engine_sizes_pool_from_cpu_count() {
        let mut fake = FakeProvider::with_processes(vec![]);
        fake.cpus = 32;
        let engine = Engine::new(Arc::new(fake), EngineConfig::default()).unwrap();
        assert_eq!(engine.sampler().workers(), MAX_WORKERS);
    }

    #[test]
    fn test_processes_sorted_limited_and_cursor_matches_output() {
        let fake = Arc::new(FakeProvider::with_processes(processes()));
        let engine = engine(&fake);

        let query = ProcessQuery {
            sort_by: SortBy::Memory,
            limit: 2,
            enable_cpu: false,
            ..Default::default()
        };
        let resp = engine.processes_at(&query, T0).unwrap();

        assert_eq!(
            resp.processes.iter().map(|p| p.pid).collect::<Vec<_>>(),
            vec![10, 11]
        );
        assert_eq!(resp.stats.sampled, 5);

        let entries: Vec<ProcessCursorEntry> = cursor::decode(&resp.cursor).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pid, 10);
        assert!((entries[0].ticks - 10.0).abs() < 1e-9);
        assert!(entries.iter().all(|e| e.timestamp == T0));
    }

    #[test]
    fn test_name_and_pid_sorts_are_ascending() {
        let fake = Arc::new(FakeProvider::with_processes(processes()));
        let engine = engine(&fake);

        let mut query = ProcessQuery {
            sort_by: SortBy::Name,
            enable_cpu: false,
            ..Default::default()
        };
        let names: Vec<String> = engine
            .processes_at(&query, T0)
            .unwrap()
            .processes
            .into_iter()
            .map(|p| p.command)
            .collect();
        assert_eq!(names, vec!["bash", "chrome", "chrome", "chrome", "init"]);

        query.sort_by = SortBy::Pid;
        let pids: Vec<u32> = engine
            .processes_at(&query, T0)
            .unwrap()
            .processes
            .into_iter()
            .map(|p| p.pid)
            .collect();
        assert_eq!(pids, vec![1, 10, 11, 12, 20]);
    }

    #[test]
    fn test_merge_runs_before_limit() {
        let fake = Arc::new(FakeProvider::with_processes(processes()));
        let engine = engine(&fake);

        let query = ProcessQuery {
            sort_by: SortBy::Memory,
            limit: 1,
            enable_cpu: false,
            merge_children: true,
            ..Default::default()
        };
        let resp = engine.processes_at(&query, T0).unwrap();

        assert_eq!(resp.processes.len(), 1);
        let chrome = &resp.processes[0];
        assert_eq!(chrome.pid, 10);
        assert_eq!(chrome.child_count, 2);
        assert_eq!(chrome.rss_kb, 600_000);
    }

    #[test]
    fn test_second_pass_uses_cursor_for_cpu() {
        let fake = Arc::new(FakeProvider::with_processes(processes()));
        let engine = engine(&fake);
        let mut query = ProcessQuery {
            sort_by: SortBy::Pid,
            ..Default::default()
        };

        let first = engine.processes_at(&query, T0).unwrap();

        let mut later = processes();
        later[1] = later[1].clone().cpu_seconds(10.5);
        later[4] = later[4].clone().cpu_seconds(0.75);
        fake.set_processes(later);

        query.cursor = Some(first.cursor);
        let second = engine.processes_at(&query, T0 + 1000).unwrap();

        let cpu = |pid: u32| second.processes.iter().find(|p| p.pid == pid).unwrap().cpu;
        assert!((cpu(10) - 50.0).abs() < 1e-9);
        assert!((cpu(20) - 25.0).abs() < 1e-9);
        assert_eq!(cpu(1), 0.0);
        // warm processes never fall back to the handle's own delta
        let warm = fake.handle(10).unwrap();
        assert_eq!(warm.cpu_percent_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_garbage_cursor_is_cold_start() {
        let fake = Arc::new(FakeProvider::with_processes(processes()));
        let engine = engine(&fake);
        let query = ProcessQuery {
            cursor: Some("!!not-a-cursor!!".to_string()),
            ..Default::default()
        };
        let resp = engine.processes_at(&query, T0).unwrap();
        assert_eq!(resp.processes.len(), 5);
        // cold start primes and then reads each handle's own delta
        let h = fake.handle(1).unwrap();
        assert_eq!(h.cpu_percent_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_faulting_process_becomes_placeholder() {
        let mut list = processes();
        list[2].panics = true;
        let fake = Arc::new(FakeProvider::with_processes(list));
        let engine = engine(&fake);

        let query = ProcessQuery {
            sort_by: SortBy::Pid,
            enable_cpu: false,
            ..Default::default()
        };
        let resp = engine.processes_at(&query, T0).unwrap();
        assert_eq!(resp.processes.len(), 5);
        assert_eq!(resp.stats.faulted, 1);
        assert_eq!(resp.processes[2], ProcessInfo::placeholder(11));
    }

    #[test]
    fn test_large_process_reports_pss_dirty() {
        let mut list = processes();
        list[1].pss_dirty_kb = Some(150_000);
        let fake = Arc::new(FakeProvider::with_processes(list));
        let engine = engine(&fake);
        let query = ProcessQuery {
            sort_by: SortBy::Pid,
            enable_cpu: false,
            ..Default::default()
        };
        let resp = engine.processes_at(&query, T0).unwrap();
        let chrome = &resp.processes[1];
        assert_eq!(chrome.memory_calculation, MemoryCalculation::PssDirty);
        assert_eq!(chrome.memory_kb, 150_000);
        assert_eq!(chrome.rss_kb, 300_000);
    }

    #[test]
    fn test_network_rates_filter_and_round_trip() {
        let mut fake = FakeProvider::with_processes(vec![]);
        fake.ifaces = vec![
            meta("lo", true, true),
            meta("eth0", true, false),
            meta("eth1", false, false),
        ];
        *fake.net.lock().unwrap() = Some(vec![
            net("lo", 9, 9),
            net("eth0", 1_000, 500),
            net("eth1", 77, 77),
            net("wlan0", 10, 20),
        ]);
        let fake = Arc::new(fake);
        let engine = engine(&fake);

        let cold = engine.network_rates_at(None, T0).unwrap();
        let names: Vec<&str> = cold.interfaces.iter().map(|i| i.interface.as_str()).collect();
        assert_eq!(names, vec!["eth0", "wlan0"]);
        assert!(cold.interfaces.iter().all(|i| i.rx_rate == 0.0 && i.tx_rate == 0.0));
        assert_eq!(cold.interfaces[0].rx_total, 1_000);

        *fake.net.lock().unwrap() = Some(vec![
            net("eth0", 5_000, 2_500),
            net("wlan0", 10, 20),
            net("wg0", 4, 4),
        ]);
        let warm = engine
            .network_rates_at(Some(&cold.cursor), T0 + 2_000)
            .unwrap();
        let eth0 = warm.interfaces.iter().find(|i| i.interface == "eth0").unwrap();
        assert!((eth0.rx_rate - 2_000.0).abs() < 1e-9);
        assert!((eth0.tx_rate - 1_000.0).abs() < 1e-9);
        let wg0 = warm.interfaces.iter().find(|i| i.interface == "wg0").unwrap();
        assert_eq!(wg0.rx_rate, 0.0);
        assert_eq!(wg0.rx_total, 4);

        let next: NetworkRateCursor = cursor::decode(&warm.cursor).unwrap();
        assert_eq!(next.timestamp, T0 + 2_000);
        assert_eq!(next.iostats.len(), 3);
    }

    #[test]
    fn test_network_rates_with_stale_clock_are_zero() {
        let fake = FakeProvider::with_processes(vec![]);
        *fake.net.lock().unwrap() = Some(vec![net("eth0", 100, 100)]);
        let fake = Arc::new(fake);
        let engine = engine(&fake);

        let first = engine.network_rates_at(None, T0).unwrap();
        *fake.net.lock().unwrap() = Some(vec![net("eth0", 900, 900)]);
        let skewed = engine.network_rates_at(Some(&first.cursor), T0 - 5_000).unwrap();
        assert_eq!(skewed.interfaces[0].rx_rate, 0.0);
        assert_eq!(skewed.interfaces[0].rx_total, 900);
    }

    #[test]
    fn test_disk_rates() {
        let fake = FakeProvider::with_processes(vec![]);
        let disk = |name: &str, r: u64, w: u64| DiskIoCounters {
            name: name.to_string(),
            read_bytes: r,
            write_bytes: w,
        };
        *fake.disks.lock().unwrap() = Some(vec![disk("sda", 0, 0), disk("nvme0n1", 100, 100)]);
        let fake = Arc::new(fake);
        let engine = engine(&fake);

        let first = engine.disk_rates_at(None, T0).unwrap();
        assert_eq!(first.disks.len(), 2);
        assert!(first.disks.iter().all(|d| d.read_rate == 0.0));

        *fake.disks.lock().unwrap() =
            Some(vec![disk("sda", 4_096, 8_192), disk("nvme0n1", 100, 100)]);
        let second = engine.disk_rates_at(Some(&first.cursor), T0 + 4_000).unwrap();
        let sda = second.disks.iter().find(|d| d.device == "sda").unwrap();
        assert!((sda.read_rate - 1_024.0).abs() < 1e-9);
        assert!((sda.write_rate - 2_048.0).abs() < 1e-9);
        assert!((second.total().write_rate - 2_048.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_info_uses_cursor_ticks() {
        let mut fake = FakeProvider::with_processes(vec![]);
        fake.cpus = 2;
        let ticks = |busy: u64, idle: u64| CpuTicks {
            user: busy,
            idle,
            ..Default::default()
        };
        *fake.cpu_ticks.lock().unwrap() = Some((
            ticks(100, 300),
            vec![ticks(50, 150), ticks(50, 150)],
        ));
        let fake = Arc::new(fake);
        let engine = engine(&fake);

        let boot = engine.cpu_info_at(None, T0).unwrap();
        assert_eq!(boot.count, 2);
        assert!((boot.usage - 25.0).abs() < 1e-9);
        assert_eq!(boot.core_usage.len(), 2);

        *fake.cpu_ticks.lock().unwrap() = Some((
            ticks(200, 400),
            vec![ticks(150, 150), ticks(50, 250)],
        ));
        let next = engine.cpu_info_at(Some(&boot.cursor), T0 + 1_000).unwrap();
        assert!((next.usage - 50.0).abs() < 1e-9);
        assert!((next.core_usage[0] - 100.0).abs() < 1e-9);
        assert!(next.core_usage[1].abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_cursors_yield_zero_rates() {
        let fake = FakeProvider::with_processes(processes());
        *fake.net.lock().unwrap() = Some(vec![net("eth0", 100, 200)]);
        *fake.disks.lock().unwrap() = Some(vec![DiskIoCounters {
            name: "sda".to_string(),
            read_bytes: 4_096,
            write_bytes: 8_192,
        }]);
        let ticks = CpuTicks {
            user: 10,
            idle: 30,
            ..Default::default()
        };
        *fake.cpu_ticks.lock().unwrap() = Some((ticks, vec![ticks]));
        let fake = Arc::new(fake);
        let engine = engine(&fake);

        let mut iostats = BTreeMap::new();
        iostats.insert(
            "eth0".to_string(),
            NetCounters {
                bytes_recv: 0,
                bytes_sent: 0,
            },
        );
        let net_cursor = cursor::encode(&NetworkRateCursor {
            timestamp: i64::MIN,
            iostats,
        })
        .unwrap();
        let rates = engine.network_rates_at(Some(&net_cursor), T0).unwrap();
        assert_eq!(rates.interfaces[0].rx_rate, 0.0);
        assert_eq!(rates.interfaces[0].tx_total, 200);

        let mut disk_stats = BTreeMap::new();
        disk_stats.insert(
            "sda".to_string(),
            DiskCounters {
                read_bytes: 0,
                write_bytes: 0,
            },
        );
        let disk_cursor = cursor::encode(&DiskRateCursor {
            timestamp: i64::MIN,
            iostats: disk_stats,
        })
        .unwrap();
        let disks = engine.disk_rates_at(Some(&disk_cursor), T0).unwrap();
        assert_eq!(disks.disks[0].write_rate, 0.0);
        assert_eq!(disks.disks[0].read_total, 4_096);

        let huge = CpuTicks {
            user: u64::MAX,
            nice: 1,
            idle: u64::MAX,
            iowait: 1,
            ..Default::default()
        };
        let cpu_cursor = cursor::encode(&CpuCursor {
            timestamp: T0 - 1_000,
            total: huge,
            cores: vec![huge],
        })
        .unwrap();
        let cpu = engine.cpu_info_at(Some(&cpu_cursor), T0).unwrap();
        assert_eq!(cpu.usage, 0.0);
        assert_eq!(cpu.core_usage, vec![0.0]);

        let proc_cursor = cursor::encode(&vec![ProcessCursorEntry {
            pid: 10,
            ticks: 0.0,
            timestamp: i64::MIN,
        }])
        .unwrap();
        let query = ProcessQuery {
            sort_by: SortBy::Pid,
            cursor: Some(proc_cursor),
            ..Default::default()
        };
        let resp = engine.processes_at(&query, T0).unwrap();
        let chrome = resp.processes.iter().find(|p| p.pid == 10).unwrap();
        assert_eq!(chrome.cpu, 0.0);
        assert_eq!(resp.processes.len(), 5);
    }

    #[test]
    fn test_memory_and_system_info() {
        let fake = Arc::new(FakeProvider::with_processes(processes()));
        let engine = engine(&fake);

        let mem = engine.memory_info().unwrap();
        assert_eq!(mem.total_kb, 1024 * 1024);
        assert!((mem.used_percent - 50.0).abs() < 1e-9);

        let sys = engine.system_info().unwrap();
        assert_eq!(sys.processes, 5);
        assert_eq!(sys.threads, 5);
    }

    #[test]
    fn test_disk_mounts_and_temperatures() {
        let mut fake = FakeProvider::with_processes(processes());
        fake.mounts = Some(vec![FsUsage {
            device: "/dev/nvme0n1p2".into(),
            mount_point: "/".into(),
            fs_type: "ext4".into(),
            total: 10 * 1024 * 1024,
            free: 6 * 1024 * 1024,
            available: 6 * 1024 * 1024,
        }]);
        fake.temps = Some(vec![
            SensorTemperature {
                key: "nvme_temp1".into(),
                current: 38.0,
                high: 80.0,
                critical: 85.0,
            },
            SensorTemperature {
                key: "coretemp_Core_0".into(),
                current: 52.5,
                ..Default::default()
            },
        ]);
        let fake = Arc::new(fake);
        let engine = engine(&fake);

        let mounts = engine.disk_mounts().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].mount_point, "/");
        assert_eq!(mounts[0].used_kb, 4 * 1024);
        assert!((mounts[0].used_percent - 40.0).abs() < 1e-9);

        let temps = engine.temperatures().unwrap();
        assert_eq!(temps[0].name, "coretemp_Core_0");
        assert_eq!(temps[0].critical, 0.0);
        assert_eq!(temps[1].name, "nvme_temp1");
        assert!((temps[1].high - 80.0).abs() < 1e-9);

        let metrics = engine.all_metrics(&MetricsQuery {
            processes: ProcessQuery {
                enable_cpu: false,
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(metrics.disk_mounts, Some(mounts));
        assert_eq!(metrics.temperatures, Some(temps));
    }

    #[test]
    fn test_all_metrics_isolates_failing_domains() {
        let fake = Arc::new(FakeProvider::with_processes(processes()));
        let engine = engine(&fake);

        let metrics = engine.all_metrics(&MetricsQuery {
            processes: ProcessQuery {
                enable_cpu: false,
                ..Default::default()
            },
            ..Default::default()
        });

        // the fake has no network, disk, sensor or CPU tick counters configured
        assert!(metrics.network.is_none());
        assert!(metrics.disk.is_none());
        assert!(metrics.disk_mounts.is_none());
        assert!(metrics.temperatures.is_none());
        assert!(metrics.cpu.is_none());
        assert!(metrics.memory.is_some());
        assert!(metrics.system.is_some());
        assert_eq!(metrics.processes.unwrap().processes.len(), 5);
    }

    #[test]
    fn test_provider_failure_surfaces_as_error() {
        let fake = Arc::new(FakeProvider::with_processes(vec![]));
        let engine = engine(&fake);
        assert!(matches!(engine.network_info(), Err(Error::Provider(ref e)) if e.kind() == io::ErrorKind::Other));
    }
}
