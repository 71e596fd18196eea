//! Prometheus self-telemetry for herakles-sysmon.
//!
//! These metrics describe the monitor itself (sampling cost, faults, request
//! volume), not the host it samples.

use anyhow::Result;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use herakles_sysmon::models::SampleStats;

#[derive(Clone)]
pub struct Telemetry {
    registry: Registry,
    pub sample_duration: Gauge,
    pub processes_sampled: Gauge,
    pub process_faults: IntCounter,
    pub requests: IntCounterVec,
}

impl Telemetry {
    /// Creates and registers all metrics with a fresh registry.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let sample_duration = Gauge::new(
            "herakles_sysmon_sample_duration_seconds",
            "Duration of the last process sampling pass",
        )?;
        let processes_sampled = Gauge::new(
            "herakles_sysmon_processes_sampled",
            "Number of processes in the last sampling pass",
        )?;
        let process_faults = IntCounter::new(
            "herakles_sysmon_process_faults_total",
            "Processes replaced by a placeholder after faulting mid-read",
        )?;
        let requests = IntCounterVec::new(
            Opts::new(
                "herakles_sysmon_requests_total",
                "HTTP requests served per endpoint",
            ),
            &["endpoint"],
        )?;

        registry.register(Box::new(sample_duration.clone()))?;
        registry.register(Box::new(processes_sampled.clone()))?;
        registry.register(Box::new(process_faults.clone()))?;
        registry.register(Box::new(requests.clone()))?;

        Ok(Self {
            registry,
            sample_duration,
            processes_sampled,
            process_faults,
            requests,
        })
    }

    pub fn record_pass(&self, stats: &SampleStats) {
        self.sample_duration.set(stats.duration_seconds);
        self.processes_sampled.set(stats.sampled as f64);
        self.process_faults.inc_by(stats.faulted as u64);
    }

    pub fn record_request(&self, endpoint: &str) {
        self.requests.with_label_values(&[endpoint]).inc();
    }

    /// Renders the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
