//! herakles-sysmon: system resource monitor.
//!
//! Serves process, CPU, memory, network and disk views over HTTP. Rate
//! endpoints hand out opaque cursors so no per-client state lives in the
//! server.

mod cli;
mod commands;
mod config;
mod handlers;
mod health_stats;
mod metrics;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

use herakles_sysmon::ProcessQuery;

use crate::cli::{Args, Commands};
use crate::commands::{command_check, command_kill, command_snapshot};
use crate::config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR,
    DEFAULT_PORT,
};
use crate::handlers::build_router;
use crate::health_stats::HealthStats;
use crate::metrics::Telemetry;
use crate::state::{build_engine, AppState};

/// Initializes the tracing subscriber. Logs go to stderr so snapshot output
/// on stdout stays machine-readable.
fn setup_logging(config: &Config) -> Result<()> {
    let level = config.log_level.as_deref().unwrap_or("info");
    let filter: LevelFilter = level
        .parse()
        .with_context(|| format!("Invalid log level '{}'", level))?;

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Logging initialized with level: {}", filter);
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting herakles-sysmon");

    let bind = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let ip: IpAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", bind))?;
    let addr = SocketAddr::new(ip, config.port.unwrap_or(DEFAULT_PORT));

    let engine = build_engine(&config)?;
    let telemetry = if config.telemetry_enabled() {
        Some(Telemetry::new().context("Failed to register telemetry")?)
    } else {
        info!("Telemetry disabled, /metrics is not served");
        None
    };

    let state = Arc::new(AppState {
        engine: Arc::new(engine),
        config: Arc::new(config),
        telemetry,
        health_stats: Arc::new(HealthStats::new()),
    });
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("herakles-sysmon listening on http://{}", addr);

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
        }
    }

    info!("herakles-sysmon stopped gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    if args.show_config {
        return show_config(&config, &args.config_format);
    }

    // `check` reports an invalid config itself.
    if !matches!(args.command, Some(Commands::Check)) {
        validate_effective_config(&config).context("Configuration invalid")?;
    }

    setup_logging(&config)?;
    herakles_sysmon::sampler::install_panic_hook();

    match args.command {
        None | Some(Commands::Serve { .. }) => serve(config).await,
        Some(Commands::Snapshot {
            domain,
            sort,
            limit,
            no_cpu,
            merge,
            cursor,
            format,
        }) => {
            let engine = build_engine(&config)?;
            let query = ProcessQuery {
                sort_by: sort,
                limit,
                enable_cpu: !no_cpu,
                cursor,
                merge_children: merge,
            };
            tokio::task::spawn_blocking(move || {
                command_snapshot(&engine, &domain, query, &format)
            })
            .await
            .context("Snapshot task failed")?
        }
        Some(Commands::Kill { pid, force }) => command_kill(pid, force),
        Some(Commands::Check) => command_check(&config),
    }
}
