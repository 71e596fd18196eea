//! `/health` endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument, warn};

use crate::state::SharedState;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "Project: https://github.com/herakles-io/herakles-sysmon - More info: https://www.herakles.io - Support: proc-mem@herakles.io";

/// Reports 503 when the process table cannot be listed, 200 otherwise.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.record_request("health");

    let engine = state.engine.clone();
    let listing = tokio::task::spawn_blocking(move || engine.provider().pids().map(|p| p.len())).await;

    let (status, message) = match listing {
        Ok(Ok(count)) => (StatusCode::OK, format!("OK - {} processes visible", count)),
        Ok(Err(e)) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Process table unreadable: {}", e),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Health check failed: {}", e),
        ),
    };

    let table = state.health_stats.render_table();
    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\n{table}\n{FOOTER_TEXT}"),
    )
}
