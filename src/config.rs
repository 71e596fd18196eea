//! Configuration loading for herakles-sysmon.
//!
//! Effective values are resolved as CLI > config file > built-in defaults.
//! Files are read as YAML, JSON or TOML depending on their extension.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use herakles_sysmon::sampler::{DEFAULT_PSS_THRESHOLD_KB, MAX_WORKERS};
use herakles_sysmon::EngineConfig;

use crate::cli::{Args, Commands, ConfigFormat};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_SYS_ROOT: &str = "/sys";
pub const DEFAULT_PRIME_INTERVAL_MS: u64 = 200;
pub const DEFAULT_THREAD_CACHE_SECS: u64 = 10;

const DEFAULT_LOCATIONS: &[&str] = &[
    "/etc/herakles/sysmon.yaml",
    "/etc/herakles/sysmon.yml",
    "/etc/herakles/sysmon.json",
    "/etc/herakles/sysmon.toml",
    "./herakles-sysmon.yaml",
    "./herakles-sysmon.yml",
    "./herakles-sysmon.json",
    "./herakles-sysmon.toml",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Server
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Logging
    pub log_level: Option<String>,

    // Data sources
    pub proc_root: Option<PathBuf>,
    pub sys_root: Option<PathBuf>,

    // Sampling
    /// Sampler workers; unset means one per CPU, capped at 8.
    pub max_workers: Option<usize>,
    pub prime_interval_ms: Option<u64>,
    pub thread_cache_secs: Option<u64>,
    pub pss_threshold_kb: Option<u64>,

    // Feature flags
    pub enable_telemetry: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            log_level: Some("info".into()),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            sys_root: Some(PathBuf::from(DEFAULT_SYS_ROOT)),
            max_workers: None,
            prime_interval_ms: Some(DEFAULT_PRIME_INTERVAL_MS),
            thread_cache_secs: Some(DEFAULT_THREAD_CACHE_SECS),
            pss_threshold_kb: Some(DEFAULT_PSS_THRESHOLD_KB),
            enable_telemetry: Some(true),
        }
    }
}

impl Config {
    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    pub fn sys_root(&self) -> PathBuf {
        self.sys_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYS_ROOT))
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.enable_telemetry.unwrap_or(true)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_workers: self.max_workers.map(|w| w.min(MAX_WORKERS)),
            prime_interval: Duration::from_millis(
                self.prime_interval_ms.unwrap_or(DEFAULT_PRIME_INTERVAL_MS),
            ),
            thread_cache_window: Duration::from_secs(
                self.thread_cache_secs.unwrap_or(DEFAULT_THREAD_CACHE_SECS),
            ),
            pss_threshold_kb: self.pss_threshold_kb.unwrap_or(DEFAULT_PSS_THRESHOLD_KB),
        }
    }
}

/// Validates the effective config (used by `check` and at startup).
pub fn validate_effective_config(cfg: &Config) -> Result<()> {
    if cfg.port == Some(0) {
        bail!("port must be between 1 and 65535");
    }
    if cfg.max_workers == Some(0) {
        bail!("max_workers must be at least 1 (leave unset for auto)");
    }
    if cfg.thread_cache_secs == Some(0) {
        bail!("thread_cache_secs must be at least 1");
    }
    if let Some(bind) = cfg.bind.as_deref() {
        bind.parse::<std::net::IpAddr>()
            .with_context(|| format!("Invalid bind address '{}'", bind))?;
    }
    if let Some(level) = cfg.log_level.as_deref() {
        match level.to_ascii_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => bail!(
                "Invalid log_level '{}', expected off, error, warn, info, debug or trace",
                other
            ),
        }
    }
    Ok(())
}

/// Loads a config file; a missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match DEFAULT_LOCATIONS.iter().map(Path::new).find(|p| p.exists()) {
            Some(p) => p.to_path_buf(),
            None => return Ok(Config::default()),
        },
    };

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            config
        }
        Some("toml") => {
            let config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            config
        }
        _ => {
            let config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            config
        }
    };
    Ok(config)
}

/// Builds the effective config from file and CLI overrides.
pub fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(level) = args.log_level.as_ref() {
        config.log_level = Some(level.as_str().to_string());
    }
    if let Some(workers) = args.max_workers {
        config.max_workers = Some(workers);
    }
    if let Some(root) = args.proc_root.as_ref() {
        config.proc_root = Some(root.clone());
    }
    if let Some(root) = args.sys_root.as_ref() {
        config.sys_root = Some(root.clone());
    }
    if let Some(Commands::Serve {
        port,
        bind,
        disable_telemetry,
    }) = &args.command
    {
        if let Some(port) = port {
            config.port = Some(*port);
        }
        if let Some(bind) = bind {
            config.bind = Some(bind.to_string());
        }
        if *disable_telemetry {
            config.enable_telemetry = Some(false);
        }
    }

    Ok(config)
}

pub fn render_config(config: &Config, format: &ConfigFormat) -> Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Prints the effective configuration in the requested format.
pub fn show_config(config: &Config, format: &ConfigFormat) -> Result<()> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::Builder;

    fn write_config(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(validate_effective_config(&cfg).is_ok());
        let engine = cfg.engine_config();
        assert_eq!(engine.prime_interval, Duration::from_millis(200));
        assert_eq!(engine.thread_cache_window, Duration::from_secs(10));
        assert_eq!(engine.pss_threshold_kb, 102_400);
        assert_eq!(engine.max_workers, None);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut cfg = Config::default();
        cfg.port = Some(0);
        assert!(validate_effective_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.max_workers = Some(0);
        assert!(validate_effective_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.thread_cache_secs = Some(0);
        assert!(validate_effective_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.bind = Some("not-an-ip".into());
        assert!(validate_effective_config(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.log_level = Some("chatty".into());
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_max_workers_is_capped() {
        let cfg = Config {
            max_workers: Some(64),
            ..Default::default()
        };
        assert_eq!(cfg.engine_config().max_workers, Some(MAX_WORKERS));
    }

    #[test]
    fn test_load_yaml_keeps_defaults_for_missing_fields() {
        let file = write_config(".yaml", "port: 9999\nmax_workers: 3\n");
        let cfg = load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.port, Some(9999));
        assert_eq!(cfg.max_workers, Some(3));
        assert_eq!(cfg.prime_interval_ms, Some(DEFAULT_PRIME_INTERVAL_MS));
        assert_eq!(cfg.bind.as_deref(), Some(DEFAULT_BIND_ADDR));
    }

    #[test]
    fn test_load_json_and_toml() {
        let json = write_config(".json", r#"{"pss_threshold_kb": 2048, "enable_telemetry": false}"#);
        let cfg = load_config(Some(json.path())).unwrap();
        assert_eq!(cfg.pss_threshold_kb, Some(2048));
        assert!(!cfg.telemetry_enabled());

        let toml = write_config(".toml", "thread_cache_secs = 30\nproc_root = \"/host/proc\"\n");
        let cfg = load_config(Some(toml.path())).unwrap();
        assert_eq!(cfg.thread_cache_secs, Some(30));
        assert_eq!(cfg.proc_root(), PathBuf::from("/host/proc"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = write_config(".json", "{ not json");
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_explicit_file_yields_defaults() {
        let cfg = load_config(Some(Path::new("/nonexistent/herakles-sysmon.yaml"))).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config(".yaml", "port: 9999\nbind: 127.0.0.1\n");
        let path = file.path().to_str().unwrap().to_string();
        let args = Args::parse_from([
            "herakles-sysmon",
            "-c",
            path.as_str(),
            "--max-workers",
            "2",
            "serve",
            "--port",
            "8080",
        ]);
        let cfg = resolve_config(&args).unwrap();
        assert_eq!(cfg.port, Some(8080));
        assert_eq!(cfg.bind.as_deref(), Some("127.0.0.1"));
        assert_eq!(cfg.max_workers, Some(2));
    }

    #[test]
    fn test_render_config_formats() {
        let cfg = Config::default();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let out = render_config(&cfg, &format).unwrap();
            assert!(out.contains("prime_interval_ms"));
        }
    }
}
