//! Deterministic in-memory provider for tests.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    CpuTicks, CpuTimes, DiskIoCounters, FsUsage, InterfaceMeta, LoadAverage, NetIoCounters,
    ProcessHandle, ProcessMemory, Provider, SensorTemperature, SharedHandle, VirtualMemory,
};

fn unavailable(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{} unavailable", what))
}

#[derive(Debug, Clone, Default)]
pub struct FakeProcess {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    pub cmdline: String,
    pub username: String,
    pub exe: String,
    pub rss: u64,
    pub cpu_seconds: f64,
    pub cpu_percent: f64,
    pub threads: u64,
    pub pss_dirty_kb: Option<u64>,
    /// Panic inside `memory_info`, as a racing exit would.
    pub panics: bool,
    /// Fail the `exe` accessor only.
    pub exe_fails: bool,
}

impl FakeProcess {
    pub fn new(pid: u32, ppid: u32, name: &str, exe: &str) -> Self {
        Self {
            pid,
            ppid,
            name: name.to_string(),
            cmdline: format!("{} --run", exe),
            username: "root".to_string(),
            exe: exe.to_string(),
            threads: 1,
            ..Default::default()
        }
    }

    pub fn rss_kb(mut self, kb: u64) -> Self {
        self.rss = kb * 1024;
        self
    }

    pub fn cpu_seconds(mut self, secs: f64) -> Self {
        self.cpu_seconds = secs;
        self
    }
}

/// Handle that counts reads so tests can observe caching and priming.
pub struct FakeHandle {
    pub process: FakeProcess,
    pub name_reads: AtomicUsize,
    pub cpu_percent_calls: AtomicUsize,
}

impl FakeHandle {
    pub fn new(process: FakeProcess) -> Self {
        Self {
            process,
            name_reads: AtomicUsize::new(0),
            cpu_percent_calls: AtomicUsize::new(0),
        }
    }
}

impl ProcessHandle for FakeHandle {
    fn pid(&self) -> u32 {
        self.process.pid
    }

    fn name(&self) -> io::Result<String> {
        self.name_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.process.name.clone())
    }

    fn cmdline(&self) -> io::Result<String> {
        Ok(self.process.cmdline.clone())
    }

    fn ppid(&self) -> io::Result<u32> {
        Ok(self.process.ppid)
    }

    fn username(&self) -> io::Result<String> {
        Ok(self.process.username.clone())
    }

    fn exe(&self) -> io::Result<String> {
        if self.process.exe_fails {
            return Err(unavailable("exe"));
        }
        Ok(self.process.exe.clone())
    }

    fn memory_info(&self) -> io::Result<ProcessMemory> {
        if self.process.panics {
            panic!("process {} vanished mid-read", self.process.pid);
        }
        Ok(ProcessMemory {
            rss: self.process.rss,
        })
    }

    fn times(&self) -> io::Result<CpuTimes> {
        Ok(CpuTimes {
            user: self.process.cpu_seconds,
            system: 0.0,
        })
    }

    fn cpu_percent(&self) -> io::Result<f64> {
        self.cpu_percent_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.process.cpu_percent)
    }

    fn num_threads(&self) -> io::Result<u64> {
        Ok(self.process.threads)
    }

    fn pss_dirty_kb(&self) -> io::Result<u64> {
        self.process
            .pss_dirty_kb
            .ok_or_else(|| unavailable("pss_dirty"))
    }
}

#[derive(Default)]
pub struct FakeProvider {
    pub handles: Mutex<Vec<Arc<FakeHandle>>>,
    pub cpus: usize,
    pub memory: Option<VirtualMemory>,
    pub cpu_ticks: Mutex<Option<(CpuTicks, Vec<CpuTicks>)>>,
    pub net: Mutex<Option<Vec<NetIoCounters>>>,
    pub ifaces: Vec<InterfaceMeta>,
    pub disks: Mutex<Option<Vec<DiskIoCounters>>>,
    pub temps: Option<Vec<SensorTemperature>>,
    pub mounts: Option<Vec<FsUsage>>,
    pub boot_time: u64,
    pub process_lookups: AtomicUsize,
}

impl FakeProvider {
    pub fn with_processes(processes: Vec<FakeProcess>) -> Self {
        let provider = Self {
            cpus: 1,
            memory: Some(VirtualMemory {
                total_kb: 1024 * 1024,
                available_kb: 512 * 1024,
                free_kb: 256 * 1024,
                ..Default::default()
            }),
            boot_time: 1_700_000_000,
            ..Default::default()
        };
        provider.set_processes(processes);
        provider
    }

    pub fn set_processes(&self, processes: Vec<FakeProcess>) {
        let handles = processes
            .into_iter()
            .map(|p| Arc::new(FakeHandle::new(p)))
            .collect();
        *self.handles.lock().unwrap() = handles;
    }

    pub fn handle(&self, pid: u32) -> Option<Arc<FakeHandle>> {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .find(|h| h.process.pid == pid)
            .cloned()
    }
}

impl Provider for FakeProvider {
    fn processes(&self) -> io::Result<Vec<SharedHandle>> {
        Ok(self
            .handles
            .lock()
            .unwrap()
            .iter()
            .map(|h| h.clone() as SharedHandle)
            .collect())
    }

    fn pids(&self) -> io::Result<Vec<u32>> {
        Ok(self
            .handles
            .lock()
            .unwrap()
            .iter()
            .map(|h| h.process.pid)
            .collect())
    }

    fn process(&self, pid: u32) -> io::Result<SharedHandle> {
        self.process_lookups.fetch_add(1, Ordering::SeqCst);
        self.handle(pid)
            .map(|h| h as SharedHandle)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such process"))
    }

    fn cpu_count(&self) -> usize {
        self.cpus.max(1)
    }

    fn cpu_times(&self) -> io::Result<(CpuTicks, Vec<CpuTicks>)> {
        self.cpu_ticks
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| unavailable("cpu times"))
    }

    fn virtual_memory(&self) -> io::Result<VirtualMemory> {
        self.memory.ok_or_else(|| unavailable("memory"))
    }

    fn load_average(&self) -> io::Result<LoadAverage> {
        Ok(LoadAverage {
            one_min: 0.5,
            five_min: 0.25,
            fifteen_min: 0.75,
        })
    }

    fn boot_time(&self) -> io::Result<u64> {
        Ok(self.boot_time)
    }

    fn net_io_counters(&self) -> io::Result<Vec<NetIoCounters>> {
        self.net
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| unavailable("network counters"))
    }

    fn interfaces(&self) -> io::Result<Vec<InterfaceMeta>> {
        Ok(self.ifaces.clone())
    }

    fn disk_io_counters(&self) -> io::Result<Vec<DiskIoCounters>> {
        self.disks
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| unavailable("disk counters"))
    }

    fn temperatures(&self) -> io::Result<Vec<SensorTemperature>> {
        self.temps.clone().ok_or_else(|| unavailable("sensors"))
    }

    fn disk_usage(&self) -> io::Result<Vec<FsUsage>> {
        self.mounts.clone().ok_or_else(|| unavailable("mounts"))
    }
}
