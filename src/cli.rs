//! CLI arguments and subcommands for herakles-sysmon.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use herakles_sysmon::SortBy;
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Output format for snapshots
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Metric domain printed by `snapshot`
#[derive(Debug, Clone, Default, ValueEnum)]
pub enum SnapshotDomain {
    #[default]
    Processes,
    Network,
    Disk,
    Mounts,
    Temperatures,
    Cpu,
    Memory,
    System,
    All,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-sysmon",
    about = "System resource monitor with cursor-based CPU, network and disk rates",
    long_about = "System resource monitor with cursor-based CPU, network and disk rates.\n\n\
                  Samples processes, memory, network and disk counters from /proc and serves \
                  them over HTTP. Rates are computed against an opaque cursor returned by the \
                  previous call, so the server keeps no per-client state.",
    author = "Michael Moll <proc-mem@herakles.io> - Herakles IO",
    version,
    propagate_version = true,
    after_help = "Project: https://github.com/herakles-io/herakles-sysmon - More info: https://www.herakles.io"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (overrides config)
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Sampler worker threads (capped at 8)
    #[arg(long, global = true)]
    pub max_workers: Option<usize>,

    /// Alternative procfs mount (e.g. a host /proc inside a container)
    #[arg(long, global = true)]
    pub proc_root: Option<PathBuf>,

    /// Alternative sysfs mount
    #[arg(long, global = true)]
    pub sys_root: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API (default)
    Serve {
        /// HTTP listen port
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Bind to specific interface/IP
        #[arg(long)]
        bind: Option<IpAddr>,

        /// Disable internal herakles_sysmon_* metrics and /metrics
        #[arg(long)]
        disable_telemetry: bool,
    },

    /// Sample once and print the result
    Snapshot {
        /// Metric domain to print
        #[arg(short = 'd', long, value_enum, default_value = "processes")]
        domain: SnapshotDomain,

        /// Sort key: cpu, memory, name or pid
        #[arg(short = 's', long, default_value = "cpu")]
        sort: SortBy,

        /// Maximum number of processes (0 = all)
        #[arg(short = 'n', long, default_value_t = 0)]
        limit: usize,

        /// Skip per-process CPU accounting
        #[arg(long)]
        no_cpu: bool,

        /// Fold child processes into parents running the same executable
        #[arg(long)]
        merge: bool,

        /// Cursor from a previous snapshot
        #[arg(long)]
        cursor: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Send SIGTERM (or SIGKILL with --force) to a process
    Kill {
        /// Target process id
        pid: u32,

        /// Use SIGKILL instead of SIGTERM
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration and system requirements
    Check,
}
