//! `/doc` endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

#[instrument(skip(state))]
pub async fn doc_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /doc request");
    state.record_request("doc");

    let version = env!("CARGO_PKG_VERSION");
    let port = state.config.port.unwrap_or(crate::config::DEFAULT_PORT);
    let doc = format!(
        r#"HERAKLES SYSTEM MONITOR - DOCUMENTATION
=======================================

VERSION: {version}

HTTP ENDPOINTS
--------------
GET /processes      - Process list (sort, limit, cpu, merge, cursor)
GET /network        - Lifetime counters per usable interface
GET /network/rates  - Interface byte rates plus primary interface (cursor)
GET /disk/rates     - Block device byte rates (cursor)
GET /disk/mounts    - Space usage per mounted block device
GET /temperatures   - Hardware temperature sensors
GET /cpu            - Aggregate and per-core CPU usage (cursor)
GET /memory         - Virtual memory summary
GET /system         - Load average, process/thread counts, boot time
GET /all            - Every domain at once (processes, cpu_cursor, disk_cursor)
GET /health         - Health check with sampling statistics (plain text)
GET /metrics        - Prometheus self-telemetry
GET /doc            - This documentation (plain text)

CURSORS
-------
Rate endpoints return a "cursor" string. Pass it back unchanged on the next
call; rates are computed over the time between the two calls. A missing or
unreadable cursor yields zero rates (CPU falls back to averages since boot).

CLI COMMANDS
------------
herakles-sysmon                      - Start the HTTP API
herakles-sysmon snapshot -n 10       - Print the top 10 processes
herakles-sysmon snapshot -d network  - Print network rates
herakles-sysmon snapshot -d mounts   - Print filesystem usage
herakles-sysmon kill <pid> [--force] - Terminate a process
herakles-sysmon check                - Validate system requirements
herakles-sysmon --show-config        - Print the effective configuration

EXAMPLE USAGE
-------------
curl 'http://localhost:{port}/processes?limit=5&sort=memory'
C=$(curl -s http://localhost:{port}/network/rates | jq -r .cursor)
sleep 2; curl "http://localhost:{port}/network/rates?cursor=$C"

{FOOTER_TEXT}
"#
    );

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        doc,
    )
}
