//! Concurrent per-process sampling.
//!
//! One sampling pass fans the live handle list out over a dedicated rayon
//! pool. Every job is tagged with its input index and wrapped in
//! [`guarded`], so a handle that panics mid-read costs only its own record:
//! the pass always yields exactly one [`ProcessInfo`] per input handle, in
//! input order.
//!
//! The default panic hook still prints every caught fault to stderr; the
//! binary replaces it with [`install_panic_hook`].

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use ahash::AHashMap as HashMap;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, warn};

use crate::cache::StaticInfoCache;
use crate::cursor::ProcessCursorEntry;
use crate::error::Result;
use crate::models::{MemoryCalculation, ProcessInfo, SampleStats};
use crate::provider::{ProcessHandle, SharedHandle};
use crate::rates::normalized_process_cpu_percent;

/// Upper bound on sampler workers regardless of core count.
pub const MAX_WORKERS: usize = 8;

/// Handles primed on a cold start.
pub const PRIME_SAMPLE_LIMIT: usize = 100;

pub const DEFAULT_PRIME_INTERVAL: Duration = Duration::from_millis(200);

/// RSS above which the dirty proportional share is consulted, in KB.
pub const DEFAULT_PSS_THRESHOLD_KB: u64 = 102_400;

/// Extracts a printable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}

thread_local! {
    static IN_GUARDED: Cell<bool> = Cell::new(false);
}

/// True while the current thread runs inside [`guarded`].
pub fn in_guarded_section() -> bool {
    IN_GUARDED.with(Cell::get)
}

/// Replaces the default stderr panic hook with one that logs through
/// `tracing`. Panics caught by [`guarded`] are already reported there, so
/// the hook only records their location at debug level; any other panic is
/// logged as an error.
pub fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = panic_message(info.payload());
        if in_guarded_section() {
            debug!("Sampler job panicked at {}: {}", location, message);
        } else {
            error!("Panic at {}: {}", location, message);
        }
    }));
}

/// Runs one unit of per-process work, converting a panic into `None`.
pub fn guarded<T, F>(pid: u32, work: F) -> Option<T>
where
    F: FnOnce() -> T,
{
    let outer = IN_GUARDED.with(|flag| flag.replace(true));
    let result = catch_unwind(AssertUnwindSafe(work));
    IN_GUARDED.with(|flag| flag.set(outer));
    match result {
        Ok(value) => Some(value),
        Err(payload) => {
            warn!(
                "Sampling pid {} faulted: {}",
                pid,
                panic_message(payload.as_ref())
            );
            None
        }
    }
}

/// Per-pass inputs shared by every job.
pub struct SampleContext<'a> {
    pub cursor: &'a HashMap<u32, ProcessCursorEntry>,
    pub enable_cpu: bool,
    /// Unix millis used for every rate in this pass.
    pub now_ms: i64,
    pub cpu_count: usize,
    /// Host memory total; 0 when unknown.
    pub total_memory_kb: u64,
}

fn percent_of_total(bytes: u64, total_kb: u64) -> f32 {
    if total_kb == 0 {
        return 0.0;
    }
    (bytes as f64 / (total_kb as f64 * 1024.0) * 100.0) as f32
}

pub struct Sampler {
    pool: ThreadPool,
    workers: usize,
    cache: StaticInfoCache,
    prime_interval: Duration,
    pss_threshold_kb: u64,
}

impl Sampler {
    /// Builds a sampler with `workers` threads, clamped to `1..=MAX_WORKERS`.
    pub fn new(workers: usize, prime_interval: Duration, pss_threshold_kb: u64) -> Result<Self> {
        let workers = workers.clamp(1, MAX_WORKERS);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sysmon-sampler-{}", i))
            .build()?;
        debug!("Sampler pool configured with {} workers", workers);
        Ok(Self {
            pool,
            workers,
            cache: StaticInfoCache::new(),
            prime_interval,
            pss_threshold_kb,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cache(&self) -> &StaticInfoCache {
        &self.cache
    }

    /// Seeds the handles' internal CPU baselines so the first real read
    /// covers a non-empty window.
    fn prime(&self, handles: &[SharedHandle]) {
        let count = handles.len().min(PRIME_SAMPLE_LIMIT);
        for handle in &handles[..count] {
            let _ = guarded(handle.pid(), || handle.cpu_percent());
        }
        debug!(
            "Primed CPU baseline for {} processes, waiting {:?}",
            count, self.prime_interval
        );
        if !self.prime_interval.is_zero() {
            thread::sleep(self.prime_interval);
        }
    }

    /// Samples every handle and returns the records in input order.
    pub fn sample(
        &self,
        handles: &[SharedHandle],
        ctx: &SampleContext<'_>,
    ) -> (Vec<ProcessInfo>, SampleStats) {
        let start = Instant::now();

        if ctx.enable_cpu && ctx.cursor.is_empty() {
            self.prime(handles);
        }

        let live: Vec<u32> = handles.iter().map(|h| h.pid()).collect();
        self.cache.prune(&live);

        let (tx, rx) = mpsc::channel();
        self.pool.scope(|s| {
            for (index, handle) in handles.iter().enumerate() {
                let tx = tx.clone();
                s.spawn(move |_| {
                    let pid = handle.pid();
                    let record = guarded(pid, || self.sample_one(handle.as_ref(), ctx));
                    let _ = tx.send((index, pid, record));
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<ProcessInfo>> = vec![None; handles.len()];
        let mut faulted = 0;
        for (index, pid, record) in rx {
            slots[index] = Some(record.unwrap_or_else(|| {
                faulted += 1;
                ProcessInfo::placeholder(pid)
            }));
        }

        let processes: Vec<ProcessInfo> = slots
            .into_iter()
            .zip(live.iter())
            .map(|(slot, &pid)| slot.unwrap_or_else(|| ProcessInfo::placeholder(pid)))
            .collect();

        let stats = SampleStats {
            sampled: processes.len(),
            faulted,
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        debug!(
            "Sampled {} processes ({} faulted) in {:.3}s",
            stats.sampled, stats.faulted, stats.duration_seconds
        );
        (processes, stats)
    }

    fn sample_one(&self, handle: &dyn ProcessHandle, ctx: &SampleContext<'_>) -> ProcessInfo {
        let pid = handle.pid();
        let info = self.cache.get(handle);
        let memory = handle.memory_info().ok();
        let cpu_ticks = handle.times().map(|t| t.total()).unwrap_or(0.0);

        let cpu = if !ctx.enable_cpu {
            0.0
        } else if let Some(prior) = ctx.cursor.get(&pid) {
            normalized_process_cpu_percent(prior, cpu_ticks, ctx.now_ms, ctx.cpu_count)
        } else {
            handle.cpu_percent().unwrap_or(0.0) / ctx.cpu_count.max(1) as f64
        };

        let mut record = ProcessInfo {
            pid,
            ppid: info.ppid,
            username: info.username,
            command: info.name,
            full_command: info.cmdline,
            executable_path: info.exe_path,
            cpu,
            cpu_ticks,
            ..Default::default()
        };

        if let Some(memory) = memory {
            record.rss_kb = memory.rss / 1024;
            record.rss_percent = percent_of_total(memory.rss, ctx.total_memory_kb);
            record.memory_kb = record.rss_kb;
            record.memory_percent = record.rss_percent;

            if record.rss_kb > self.pss_threshold_kb {
                if let Ok(pss_dirty) = handle.pss_dirty_kb() {
                    if pss_dirty > 0 {
                        record.memory_kb = pss_dirty;
                        record.memory_percent =
                            percent_of_total(pss_dirty * 1024, ctx.total_memory_kb);
                        record.memory_calculation = MemoryCalculation::PssDirty;
                    }
                }
            }
        }

        record
    }
}
