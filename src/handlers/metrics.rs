//! `/metrics` endpoint handler for Prometheus scraping.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    Disabled,
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        match self {
            MetricsError::Disabled => {
                (StatusCode::NOT_FOUND, "Telemetry is disabled").into_response()
            }
            MetricsError::EncodingFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response(),
        }
    }
}

#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    debug!("Processing /metrics request");
    state.record_request("metrics");

    let telemetry = state.telemetry.as_ref().ok_or(MetricsError::Disabled)?;
    telemetry.encode().map_err(|e| {
        error!("Failed to encode telemetry: {}", e);
        MetricsError::EncodingFailed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::test_state;

    #[tokio::test]
    async fn test_metrics_counts_own_request() {
        let body = metrics_handler(State(test_state())).await.unwrap();
        assert!(body.contains("herakles_sysmon_requests_total{endpoint=\"metrics\"} 1"));
    }
}
