//! Snapshot command implementation.
//!
//! Runs one engine call for the requested domain and prints it. The printed
//! `cursor` can be passed back with `--cursor` to get rates over the gap.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use herakles_sysmon::interface::select_primary_interface;
use herakles_sysmon::{Engine, MetricsQuery, ProcessQuery};

use crate::cli::{OutputFormat, SnapshotDomain};
use crate::handlers::api::NetworkRatesBody;

fn render<T: Serialize>(value: &T, format: &OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

/// Samples `domain` once and renders it. `query.cursor` feeds whichever
/// domain is selected.
pub fn render_snapshot(
    engine: &Engine,
    domain: &SnapshotDomain,
    query: ProcessQuery,
    format: &OutputFormat,
) -> Result<String> {
    let cursor = query.cursor.clone();
    match domain {
        SnapshotDomain::Processes => {
            let resp = engine.processes(&query)?;
            info!(
                "Sampled {} processes ({} faulted) in {:.3}s",
                resp.stats.sampled, resp.stats.faulted, resp.stats.duration_seconds
            );
            render(&resp, format)
        }
        SnapshotDomain::Network => {
            let rates = engine.network_rates(cursor.as_deref())?;
            let primary = select_primary_interface(&rates.interfaces).map(|i| i.interface.clone());
            render(&NetworkRatesBody { rates, primary }, format)
        }
        SnapshotDomain::Disk => render(&engine.disk_rates(cursor.as_deref())?, format),
        SnapshotDomain::Mounts => render(&engine.disk_mounts()?, format),
        SnapshotDomain::Temperatures => render(&engine.temperatures()?, format),
        SnapshotDomain::Cpu => render(&engine.cpu_info(cursor.as_deref())?, format),
        SnapshotDomain::Memory => render(&engine.memory_info()?, format),
        SnapshotDomain::System => render(&engine.system_info()?, format),
        SnapshotDomain::All => {
            let metrics = engine.all_metrics(&MetricsQuery {
                processes: query,
                cpu_cursor: None,
                disk_cursor: None,
            });
            render(&metrics, format)
        }
    }
}

pub fn command_snapshot(
    engine: &Engine,
    domain: &SnapshotDomain,
    query: ProcessQuery,
    format: &OutputFormat,
) -> Result<()> {
    println!("{}", render_snapshot(engine, domain, query, format)?);
    Ok(())
}
