//! `/proc` and `/sys` backed provider for Linux.
//!
//! Both roots are configurable so tests can point the provider at a fake
//! tree. Parsing helpers operate on file contents and are tested directly.

use ahash::{AHashMap as HashMap, AHashSet};
use once_cell::sync::Lazy;
use std::ffi::CString;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

use super::{
    CpuTicks, CpuTimes, DiskIoCounters, FsUsage, InterfaceMeta, LoadAverage, NetIoCounters,
    ProcessHandle, ProcessMemory, Provider, SensorTemperature, SharedHandle, VirtualMemory,
};

/// Kernel clock ticks per second, used to convert utime/stime to seconds.
static CLOCK_TICKS: Lazy<f64> = Lazy::new(|| {
    // SAFETY: sysconf has no preconditions.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as f64
    } else {
        100.0
    }
});

const SECTOR_SIZE: u64 = 512;
const IFF_UP: u32 = 0x1;
const IFF_LOOPBACK: u32 = 0x8;

/// Provider reading from a procfs root (normally `/proc`) and a sysfs root
/// (normally `/sys`).
#[derive(Debug, Clone)]
pub struct LinuxProvider {
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl Default for LinuxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxProvider {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    fn read_root_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.proc_root.join(name))
    }
}

impl Provider for LinuxProvider {
    fn processes(&self) -> io::Result<Vec<SharedHandle>> {
        let pids = self.pids()?;
        Ok(pids
            .into_iter()
            .map(|pid| {
                Arc::new(LinuxProcess::new(pid, self.proc_root.join(pid.to_string())))
                    as SharedHandle
            })
            .collect())
    }

    fn pids(&self) -> io::Result<Vec<u32>> {
        collect_pids(&self.proc_root)
    }

    fn process(&self, pid: u32) -> io::Result<SharedHandle> {
        let path = self.proc_root.join(pid.to_string());
        if !path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("process {} not found", pid),
            ));
        }
        Ok(Arc::new(LinuxProcess::new(pid, path)))
    }

    fn cpu_count(&self) -> usize {
        // SAFETY: sysconf has no preconditions.
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if n > 0 {
            n as usize
        } else {
            1
        }
    }

    fn cpu_times(&self) -> io::Result<(CpuTicks, Vec<CpuTicks>)> {
        parse_cpu_ticks(&self.read_root_file("stat")?)
    }

    fn virtual_memory(&self) -> io::Result<VirtualMemory> {
        parse_meminfo(&self.read_root_file("meminfo")?)
    }

    fn load_average(&self) -> io::Result<LoadAverage> {
        parse_load_average(&self.read_root_file("loadavg")?)
    }

    fn boot_time(&self) -> io::Result<u64> {
        parse_boot_time(&self.read_root_file("stat")?)
    }

    fn net_io_counters(&self) -> io::Result<Vec<NetIoCounters>> {
        parse_net_dev(&self.read_root_file("net/dev")?)
    }

    fn interfaces(&self) -> io::Result<Vec<InterfaceMeta>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(self.sys_root.join("class/net"))?.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let flags = fs::read_to_string(entry.path().join("flags"))
                .ok()
                .and_then(|s| parse_hex_flags(&s))
                .unwrap_or(0);
            out.push(InterfaceMeta {
                name,
                up: flags & IFF_UP != 0,
                loopback: flags & IFF_LOOPBACK != 0,
            });
        }
        Ok(out)
    }

    fn disk_io_counters(&self) -> io::Result<Vec<DiskIoCounters>> {
        parse_diskstats(&self.read_root_file("diskstats")?)
    }

    fn temperatures(&self) -> io::Result<Vec<SensorTemperature>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(self.sys_root.join("class/hwmon"))?.flatten() {
            out.extend(read_hwmon_chip(&entry.path()));
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn disk_usage(&self) -> io::Result<Vec<FsUsage>> {
        let mounts = parse_mounts(&self.read_root_file("mounts")?);
        let mut out = Vec::with_capacity(mounts.len());
        for mount in mounts {
            match statvfs_usage(Path::new(&mount.mount_point)) {
                Ok((total, free, available)) => out.push(FsUsage {
                    device: mount.device,
                    mount_point: mount.mount_point,
                    fs_type: mount.fs_type,
                    total,
                    free,
                    available,
                }),
                Err(e) => debug!("Skipping mount {}: {}", mount.mount_point, e),
            }
        }
        Ok(out)
    }
}

/// Handle for one `/proc/<pid>` directory.
pub struct LinuxProcess {
    pid: u32,
    proc_path: PathBuf,
    last_cpu: Mutex<Option<(f64, Instant)>>,
}

impl LinuxProcess {
    pub fn new(pid: u32, proc_path: PathBuf) -> Self {
        Self {
            pid,
            proc_path,
            last_cpu: Mutex::new(None),
        }
    }

    fn stat(&self) -> io::Result<StatFields> {
        let content = fs::read_to_string(self.proc_path.join("stat"))?;
        parse_stat(&content)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Invalid stat format"))
    }

    fn status_value(&self, key: &str) -> io::Result<String> {
        let file = fs::File::open(self.proc_path.join("status"))?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if let Some(v) = line.strip_prefix(key) {
                return Ok(v.trim().to_string());
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} missing from status", key),
        ))
    }
}

impl ProcessHandle for LinuxProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn name(&self) -> io::Result<String> {
        read_process_name(&self.proc_path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "could not read process name")
        })
    }

    fn cmdline(&self) -> io::Result<String> {
        let raw = fs::read(self.proc_path.join("cmdline"))?;
        Ok(join_cmdline(&raw))
    }

    fn ppid(&self) -> io::Result<u32> {
        Ok(self.stat()?.ppid)
    }

    fn username(&self) -> io::Result<String> {
        let uid_line = self.status_value("Uid:")?;
        let uid: u32 = uid_line
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid Uid line"))?;
        Ok(users::get_user_by_uid(uid)
            .map(|u| u.name().to_string_lossy().into_owned())
            .unwrap_or_else(|| uid.to_string()))
    }

    fn exe(&self) -> io::Result<String> {
        let target = fs::read_link(self.proc_path.join("exe"))?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn memory_info(&self) -> io::Result<ProcessMemory> {
        let kb = parse_kb_value(&self.status_value("VmRSS:")?).unwrap_or(0);
        Ok(ProcessMemory { rss: kb * 1024 })
    }

    fn times(&self) -> io::Result<CpuTimes> {
        let stat = self.stat()?;
        Ok(CpuTimes {
            user: stat.utime as f64 / *CLOCK_TICKS,
            system: stat.stime as f64 / *CLOCK_TICKS,
        })
    }

    fn cpu_percent(&self) -> io::Result<f64> {
        let now = Instant::now();
        let cpu_time = self.times()?.total();

        let mut last = match self.last_cpu.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let percent = match *last {
            Some((prev_cpu, prev_at)) => {
                let dt = now.duration_since(prev_at).as_secs_f64();
                if dt > 0.0 && cpu_time > prev_cpu {
                    (cpu_time - prev_cpu) / dt * 100.0
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        *last = Some((cpu_time, now));
        Ok(percent)
    }

    fn num_threads(&self) -> io::Result<u64> {
        self.status_value("Threads:")?
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid Threads line"))
    }

    fn pss_dirty_kb(&self) -> io::Result<u64> {
        let rollup = self.proc_path.join("smaps_rollup");
        let file = fs::File::open(rollup)?;
        parse_pss_dirty(BufReader::with_capacity(64 * 1024, file))
    }
}

/// Fields of `/proc/<pid>/stat` the engine needs.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StatFields {
    ppid: u32,
    utime: u64,
    stime: u64,
}

/// Parses `/proc/<pid>/stat`. The comm field may contain spaces and
/// parentheses, so fields are counted from the last `)`.
fn parse_stat(content: &str) -> Option<StatFields> {
    let rest = &content[content.rfind(')')? + 1..];
    let parts: Vec<&str> = rest.split_whitespace().collect();
    // parts[0] is field 3 (state)
    if parts.len() < 13 {
        return None;
    }
    Some(StatFields {
        ppid: parts[1].parse().ok()?,
        utime: parts[11].parse().unwrap_or(0),
        stime: parts[12].parse().unwrap_or(0),
    })
}

/// Scans a proc root for numeric directory names.
fn collect_pids(root: &Path) -> io::Result<Vec<u32>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root)?.flatten() {
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(v) => v,
            None => continue,
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Ok(pid) = name.parse::<u32>() {
            out.push(pid);
        }
    }
    out.sort_unstable();
    debug!("Collected {} pids from {}", out.len(), root.display());
    Ok(out)
}

/// Reads process name from comm file or extracts from cmdline
fn read_process_name(proc_path: &Path) -> Option<String> {
    if let Ok(s) = fs::read_to_string(proc_path.join("comm")) {
        let t = s.trim();
        if !t.is_empty() {
            return Some(t.into());
        }
    }

    let content = fs::read(proc_path.join("cmdline")).ok()?;
    let first = content
        .split(|&b| b == 0u8)
        .find(|s| !s.is_empty())
        .and_then(|s| std::str::from_utf8(s).ok())?;
    Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
}

fn join_cmdline(raw: &[u8]) -> String {
    raw.split(|&b| b == 0u8)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses kilobyte values such as `"  1234 kB"`.
fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace().next()?.parse().ok()
}

/// Sums `Pss_Dirty:` lines of an smaps_rollup stream. Kernels without the
/// field yield an error so callers keep the RSS figure.
fn parse_pss_dirty<R: BufRead>(reader: R) -> io::Result<u64> {
    let mut found = false;
    let mut kb = 0;
    for line in reader.lines() {
        let l = line?;
        if let Some(v) = l.strip_prefix("Pss_Dirty:") {
            kb += parse_kb_value(v).unwrap_or(0);
            found = true;
        }
    }
    if found {
        Ok(kb)
    } else {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Pss_Dirty not reported by this kernel",
        ))
    }
}

fn parse_cpu_ticks(content: &str) -> io::Result<(CpuTicks, Vec<CpuTicks>)> {
    let mut total = None;
    let mut cores = Vec::new();

    for line in content.lines() {
        if !line.starts_with("cpu") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 {
            continue;
        }
        let field = |i: usize| parts.get(i).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        let ticks = CpuTicks {
            user: field(1),
            nice: field(2),
            system: field(3),
            idle: field(4),
            iowait: field(5),
            irq: field(6),
            softirq: field(7),
            steal: field(8),
        };
        if parts[0] == "cpu" {
            total = Some(ticks);
        } else {
            cores.push(ticks);
        }
    }

    match total {
        Some(t) => Ok((t, cores)),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "No CPU statistics found in stat",
        )),
    }
}

fn parse_boot_time(content: &str) -> io::Result<u64> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "btime missing from stat"))
}

/// Format: "0.00 0.01 0.05 1/234 5678"
fn parse_load_average(content: &str) -> io::Result<LoadAverage> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Invalid loadavg format: expected at least 3 fields, got {}",
                parts.len()
            ),
        ));
    }
    let parse = |s: &str| {
        s.parse::<f64>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    };
    Ok(LoadAverage {
        one_min: parse(parts[0])?,
        five_min: parse(parts[1])?,
        fifteen_min: parse(parts[2])?,
    })
}

fn parse_meminfo(content: &str) -> io::Result<VirtualMemory> {
    let mut values: HashMap<&str, u64> = HashMap::new();
    for line in content.lines() {
        if let Some((key, rest)) = line.split_once(':') {
            if let Some(kb) = parse_kb_value(rest) {
                values.insert(key.trim(), kb);
            }
        }
    }

    let total_kb = *values.get("MemTotal").ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "MemTotal missing from meminfo")
    })?;
    let free_kb = values.get("MemFree").copied().unwrap_or(0);
    let buffers_kb = values.get("Buffers").copied().unwrap_or(0);
    let cached_kb = values.get("Cached").copied().unwrap_or(0);
    // Kernels before 3.14 lack MemAvailable
    let available_kb = values
        .get("MemAvailable")
        .copied()
        .unwrap_or(free_kb + buffers_kb + cached_kb);

    Ok(VirtualMemory {
        total_kb,
        available_kb,
        free_kb,
        buffers_kb,
        cached_kb,
        swap_total_kb: values.get("SwapTotal").copied().unwrap_or(0),
        swap_free_kb: values.get("SwapFree").copied().unwrap_or(0),
    })
}

fn parse_net_dev(content: &str) -> io::Result<Vec<NetIoCounters>> {
    let mut out = Vec::new();
    // two header lines
    for line in content.lines().skip(2) {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }
        out.push(NetIoCounters {
            name: name.trim().to_string(),
            bytes_recv: fields[0].parse().unwrap_or(0),
            bytes_sent: fields[8].parse().unwrap_or(0),
        });
    }
    Ok(out)
}

fn parse_hex_flags(s: &str) -> Option<u32> {
    let t = s.trim();
    u32::from_str_radix(t.strip_prefix("0x").unwrap_or(t), 16).ok()
}

fn parse_diskstats(content: &str) -> io::Result<Vec<DiskIoCounters>> {
    let mut out = Vec::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];
        if name.starts_with("loop") || name.starts_with("ram") {
            continue;
        }
        let sectors_read: u64 = fields[5].parse().unwrap_or(0);
        let sectors_written: u64 = fields[9].parse().unwrap_or(0);
        out.push(DiskIoCounters {
            name: name.to_string(),
            read_bytes: sectors_read.saturating_mul(SECTOR_SIZE),
            write_bytes: sectors_written.saturating_mul(SECTOR_SIZE),
        });
    }
    Ok(out)
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Reads a millidegree sysfs value as degrees Celsius.
fn read_millidegrees(path: &Path) -> Option<f64> {
    read_trimmed(path)?.parse::<f64>().ok().map(|v| v / 1000.0)
}

/// Every `temp*_input` channel of one `/sys/class/hwmon/hwmonN` directory.
/// Keys are `<chip>_<label>`, or `<chip>_<channel>` for unlabeled channels.
fn read_hwmon_chip(dir: &Path) -> Vec<SensorTemperature> {
    let chip = read_trimmed(&dir.join("name")).unwrap_or_else(|| {
        dir.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let Ok(files) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for file in files.flatten() {
        let fname = file.file_name().to_string_lossy().into_owned();
        let Some(channel) = fname
            .strip_suffix("_input")
            .filter(|c| c.starts_with("temp"))
        else {
            continue;
        };
        let Some(current) = read_millidegrees(&file.path()) else {
            continue;
        };
        let label = read_trimmed(&dir.join(format!("{}_label", channel)))
            .unwrap_or_else(|| channel.to_string());
        out.push(SensorTemperature {
            key: format!("{}_{}", chip, label.replace(' ', "_")),
            current,
            high: read_millidegrees(&dir.join(format!("{}_max", channel))).unwrap_or(0.0),
            critical: read_millidegrees(&dir.join(format!("{}_crit", channel))).unwrap_or(0.0),
        });
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
struct MountEntry {
    device: String,
    mount_point: String,
    fs_type: String,
}

/// Undoes the octal escaping `/proc/mounts` applies to spaces, tabs,
/// newlines and backslashes in paths.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let octal = bytes
            .get(i + 1..i + 4)
            .filter(|digits| bytes[i] == b'\\' && digits.iter().all(|b| (b'0'..=b'7').contains(b)));
        if let Some(digits) = octal {
            let code = digits
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            if let Ok(byte) = u8::try_from(code) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Block-device mounts from `/proc/mounts`, first entry per mount point.
fn parse_mounts(content: &str) -> Vec<MountEntry> {
    let mut seen = AHashSet::new();
    let mut out = Vec::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || !fields[0].starts_with("/dev/") {
            continue;
        }
        let mount_point = unescape_mount_field(fields[1]);
        if !seen.insert(mount_point.clone()) {
            continue;
        }
        out.push(MountEntry {
            device: unescape_mount_field(fields[0]),
            mount_point,
            fs_type: fields[2].to_string(),
        });
    }
    out
}

/// Total, free and available bytes of the filesystem holding `path`.
fn statvfs_usage(path: &Path) -> io::Result<(u64, u64, u64)> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: statvfs is a plain C struct; an all-zero value is valid and the
    // call overwrites it.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and outlives the call.
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    let block_size = stat.f_frsize as u64;
    Ok((
        (stat.f_blocks as u64).saturating_mul(block_size),
        (stat.f_bfree as u64).saturating_mul(block_size),
        (stat.f_bavail as u64).saturating_mul(block_size),
    ))
}
