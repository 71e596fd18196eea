//! System check command implementation.

use anyhow::{bail, Result};
use std::fs;

use herakles_sysmon::provider::{LinuxProvider, ProcessHandle, Provider};

use crate::config::{validate_effective_config, Config};

/// Outcome of one check line.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub label: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl CheckResult {
    fn new(label: &'static str, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            label,
            ok,
            detail: detail.into(),
        }
    }
}

/// Runs every check without printing.
pub fn run_checks(config: &Config) -> Vec<CheckResult> {
    let provider = LinuxProvider::with_roots(config.proc_root(), config.sys_root());
    let mut results = Vec::new();

    results.push(match provider.pids() {
        Ok(pids) if !pids.is_empty() => CheckResult::new(
            "proc",
            true,
            format!("{} readable, {} processes", config.proc_root().display(), pids.len()),
        ),
        Ok(_) => CheckResult::new(
            "proc",
            false,
            format!("no process entries under {}", config.proc_root().display()),
        ),
        Err(e) => CheckResult::new(
            "proc",
            false,
            format!("cannot read {}: {}", config.proc_root().display(), e),
        ),
    });

    let own_pid = std::process::id();
    results.push(
        match provider
            .process(own_pid)
            .and_then(|handle| handle.pss_dirty_kb())
        {
            Ok(kb) => CheckResult::new(
                "smaps_rollup",
                true,
                format!("available, own Pss_Dirty {} KB", kb),
            ),
            // Non-fatal: the sampler falls back to RSS.
            Err(e) => CheckResult::new(
                "smaps_rollup",
                true,
                format!("unavailable ({}), RSS only", e),
            ),
        },
    );

    results.push(match provider.interfaces() {
        Ok(ifaces) => CheckResult::new(
            "network",
            true,
            format!("{} interfaces found", ifaces.len()),
        ),
        Err(e) => CheckResult::new(
            "network",
            false,
            format!(
                "cannot read {}: {}",
                config.sys_root().join("class/net").display(),
                e
            ),
        ),
    });

    results.push(match fs::metadata(config.proc_root().join("diskstats")) {
        Ok(_) => CheckResult::new("disk", true, "diskstats readable"),
        Err(e) => CheckResult::new("disk", false, format!("diskstats unavailable: {}", e)),
    });

    results.push(match provider.temperatures() {
        Ok(temps) => CheckResult::new(
            "sensors",
            true,
            format!("{} temperature sensors found", temps.len()),
        ),
        // Non-fatal: VMs and containers often have no hwmon tree.
        Err(e) => CheckResult::new("sensors", true, format!("unavailable ({})", e)),
    });

    results.push(match validate_effective_config(config) {
        Ok(()) => CheckResult::new("config", true, "configuration is valid"),
        Err(e) => CheckResult::new("config", false, format!("configuration invalid: {}", e)),
    });

    results
}

pub fn command_check(config: &Config) -> Result<()> {
    println!("🔍 Herakles System Monitor - System Check");
    println!("=========================================");

    let results = run_checks(config);
    for r in &results {
        let mark = if r.ok { "✅" } else { "❌" };
        println!("   {} {:<13} {}", mark, r.label, r.detail);
    }

    println!("\n📋 Summary:");
    if results.iter().all(|r| r.ok) {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        bail!("system check failed")
    }
}
