//! HTTP endpoint handlers.
//!
//! - `/processes`, `/network`, `/network/rates`, `/disk/rates`,
//!   `/disk/mounts`, `/temperatures`, `/cpu`, `/memory`, `/system`, `/all`:
//!   JSON views of the engine
//! - `/health`: plain-text health check
//! - `/metrics`: Prometheus self-telemetry (when enabled)
//! - `/doc`: plain-text documentation

pub mod api;
pub mod doc;
pub mod health;
pub mod metrics;

use axum::{routing::get, Router};

use crate::state::SharedState;

pub use doc::doc_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;

pub fn build_router(state: SharedState) -> Router {
    let mut app = Router::new()
        .route("/processes", get(api::processes_handler))
        .route("/network", get(api::network_handler))
        .route("/network/rates", get(api::network_rates_handler))
        .route("/disk/rates", get(api::disk_rates_handler))
        .route("/disk/mounts", get(api::disk_mounts_handler))
        .route("/temperatures", get(api::temperatures_handler))
        .route("/cpu", get(api::cpu_handler))
        .route("/memory", get(api::memory_handler))
        .route("/system", get(api::system_handler))
        .route("/all", get(api::all_handler))
        .route("/health", get(health_handler))
        .route("/doc", get(doc_handler));

    if state.telemetry.is_some() {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.with_state(state)
}
