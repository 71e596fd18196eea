//! Running statistics over sampling passes, rendered by `/health`.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use herakles_sysmon::models::SampleStats;

#[derive(Clone, Copy, Default)]
struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = RunningStat {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Default)]
struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (last, avg, max, min)
    fn snapshot(&self) -> (f64, f64, f64, f64) {
        match self.inner.lock() {
            Ok(s) => (s.last, s.avg(), s.max, s.min),
            Err(_) => (0.0, 0.0, 0.0, 0.0),
        }
    }
}

#[derive(Default)]
pub struct HealthStats {
    sampled_processes: Stat,
    faulted_processes: Stat,
    sample_duration_seconds: Stat,
    total_passes: AtomicU64,
    http_requests: AtomicU64,
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_pass(&self, stats: &SampleStats) {
        self.sampled_processes.add_sample(stats.sampled as f64);
        self.faulted_processes.add_sample(stats.faulted as f64);
        self.sample_duration_seconds
            .add_sample(stats.duration_seconds);
        self.total_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_passes(&self) -> u64 {
        self.total_passes.load(Ordering::Relaxed)
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "metric",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();
        writeln!(out, "{}", "-".repeat(left_col + 3 + (col_w + 3) * 4)).ok();

        let rows: [(&str, &Stat, usize); 3] = [
            ("sampled processes", &self.sampled_processes, 0),
            ("faulted processes", &self.faulted_processes, 0),
            ("sample duration (s)", &self.sample_duration_seconds, 3),
        ];
        for (label, stat, precision) in rows {
            let (cur, avg, max, min) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.p$}", cur, p = precision),
                format!("{:.p$}", avg, p = precision.max(1)),
                format!("{:.p$}", max, p = precision),
                format!("{:.p$}", min, p = precision),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(out, "number of sampling passes: {}", self.total_passes()).ok();
        writeln!(
            out,
            "http requests served: {}",
            self.http_requests.load(Ordering::Relaxed)
        )
        .ok();
        out
    }
}
