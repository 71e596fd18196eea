//! Application state shared by the HTTP handlers.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use herakles_sysmon::models::SampleStats;
use herakles_sysmon::provider::LinuxProvider;
use herakles_sysmon::Engine;

use crate::config::Config;
use crate::health_stats::HealthStats;
use crate::metrics::Telemetry;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
    /// `None` when telemetry is disabled.
    pub telemetry: Option<Telemetry>,
    pub health_stats: Arc<HealthStats>,
}

impl AppState {
    pub fn record_request(&self, endpoint: &str) {
        self.health_stats.record_http_request();
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_request(endpoint);
        }
    }

    pub fn record_pass(&self, stats: &SampleStats) {
        self.health_stats.record_pass(stats);
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_pass(stats);
        }
    }
}

/// Builds an engine over the configured proc/sys roots.
pub fn build_engine(config: &Config) -> Result<Engine> {
    let provider = Arc::new(LinuxProvider::with_roots(
        config.proc_root(),
        config.sys_root(),
    ));
    let engine = Engine::new(provider, config.engine_config())
        .context("Failed to start sampler worker pool")?;
    debug!(
        "Engine ready with {} sampler workers over {}",
        engine.sampler().workers(),
        config.proc_root().display()
    );
    Ok(engine)
}
