//! JSON endpoints backed by the engine.
//!
//! Engine calls block on procfs reads (and may sleep while priming CPU
//! baselines), so each one runs on the blocking thread pool. Cursors travel
//! in the `cursor` query parameter.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use herakles_sysmon::interface::select_primary_interface;
use herakles_sysmon::models::{
    CpuInfo, DiskMountInfo, DiskRateResponse, MemoryInfo, NetworkInfo, NetworkRateResponse,
    ProcessListResponse, SystemInfo, SystemMetrics, TemperatureInfo,
};
use herakles_sysmon::{Engine, MetricsQuery, ProcessQuery, SortBy};

use crate::state::SharedState;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Engine(herakles_sysmon::Error),
    Join(tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Engine(e) => {
                error!("Engine request failed: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
            ApiError::Join(e) => {
                error!("Blocking task failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Sampling task failed").into_response()
            }
        }
    }
}

/// Runs an engine call on the blocking pool.
async fn run_blocking<T, F>(state: &SharedState, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&Engine) -> herakles_sysmon::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || call(&engine))
        .await
        .map_err(ApiError::Join)?
        .map_err(ApiError::Engine)
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessParams {
    pub sort: Option<String>,
    pub limit: Option<usize>,
    pub cpu: Option<bool>,
    pub merge: Option<bool>,
    pub cursor: Option<String>,
}

impl ProcessParams {
    pub fn into_query(self) -> Result<ProcessQuery, ApiError> {
        let sort_by = match self.sort.as_deref() {
            None | Some("") => SortBy::default(),
            Some(s) => s.parse().map_err(ApiError::BadRequest)?,
        };
        Ok(ProcessQuery {
            sort_by,
            limit: self.limit.unwrap_or(0),
            enable_cpu: self.cpu.unwrap_or(true),
            cursor: self.cursor.filter(|c| !c.is_empty()),
            merge_children: self.merge.unwrap_or(false),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CursorParams {
    pub cursor: Option<String>,
}

/// Query of `/all`; process fields as in [`ProcessParams`].
#[derive(Debug, Default, Deserialize)]
pub struct AllParams {
    pub sort: Option<String>,
    pub limit: Option<usize>,
    pub cpu: Option<bool>,
    pub merge: Option<bool>,
    pub cursor: Option<String>,
    pub cpu_cursor: Option<String>,
    pub disk_cursor: Option<String>,
}

impl AllParams {
    pub fn into_query(self) -> Result<MetricsQuery, ApiError> {
        let processes = ProcessParams {
            sort: self.sort,
            limit: self.limit,
            cpu: self.cpu,
            merge: self.merge,
            cursor: self.cursor,
        }
        .into_query()?;
        Ok(MetricsQuery {
            processes,
            cpu_cursor: self.cpu_cursor.filter(|c| !c.is_empty()),
            disk_cursor: self.disk_cursor.filter(|c| !c.is_empty()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct NetworkRatesBody {
    #[serde(flatten)]
    pub rates: NetworkRateResponse,
    /// Interface to headline, if any.
    pub primary: Option<String>,
}

#[instrument(skip(state))]
pub async fn processes_handler(
    State(state): State<SharedState>,
    Query(params): Query<ProcessParams>,
) -> Result<Json<ProcessListResponse>, ApiError> {
    state.record_request("processes");
    let query = params.into_query()?;
    let resp = run_blocking(&state, move |engine| engine.processes(&query)).await?;
    state.record_pass(&resp.stats);
    Ok(Json(resp))
}

#[instrument(skip(state))]
pub async fn network_rates_handler(
    State(state): State<SharedState>,
    Query(params): Query<CursorParams>,
) -> Result<Json<NetworkRatesBody>, ApiError> {
    state.record_request("network_rates");
    let rates = run_blocking(&state, move |engine| {
        engine.network_rates(params.cursor.as_deref())
    })
    .await?;
    let primary = select_primary_interface(&rates.interfaces).map(|i| i.interface.clone());
    Ok(Json(NetworkRatesBody { rates, primary }))
}

#[instrument(skip(state))]
pub async fn network_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<NetworkInfo>>, ApiError> {
    state.record_request("network");
    Ok(Json(run_blocking(&state, |engine| engine.network_info()).await?))
}

#[instrument(skip(state))]
pub async fn disk_rates_handler(
    State(state): State<SharedState>,
    Query(params): Query<CursorParams>,
) -> Result<Json<DiskRateResponse>, ApiError> {
    state.record_request("disk_rates");
    let resp = run_blocking(&state, move |engine| {
        engine.disk_rates(params.cursor.as_deref())
    })
    .await?;
    Ok(Json(resp))
}

#[instrument(skip(state))]
pub async fn disk_mounts_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<DiskMountInfo>>, ApiError> {
    state.record_request("disk_mounts");
    Ok(Json(run_blocking(&state, |engine| engine.disk_mounts()).await?))
}

#[instrument(skip(state))]
pub async fn temperatures_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<TemperatureInfo>>, ApiError> {
    state.record_request("temperatures");
    Ok(Json(run_blocking(&state, |engine| engine.temperatures()).await?))
}

#[instrument(skip(state))]
pub async fn cpu_handler(
    State(state): State<SharedState>,
    Query(params): Query<CursorParams>,
) -> Result<Json<CpuInfo>, ApiError> {
    state.record_request("cpu");
    let resp = run_blocking(&state, move |engine| {
        engine.cpu_info(params.cursor.as_deref())
    })
    .await?;
    Ok(Json(resp))
}

#[instrument(skip(state))]
pub async fn memory_handler(State(state): State<SharedState>) -> Result<Json<MemoryInfo>, ApiError> {
    state.record_request("memory");
    Ok(Json(run_blocking(&state, |engine| engine.memory_info()).await?))
}

#[instrument(skip(state))]
pub async fn system_handler(State(state): State<SharedState>) -> Result<Json<SystemInfo>, ApiError> {
    state.record_request("system");
    Ok(Json(run_blocking(&state, |engine| engine.system_info()).await?))
}

/// Every domain at once; failed domains serialize as `null`.
#[instrument(skip(state))]
pub async fn all_handler(
    State(state): State<SharedState>,
    Query(params): Query<AllParams>,
) -> Result<Json<SystemMetrics>, ApiError> {
    state.record_request("all");
    let query = params.into_query()?;
    let metrics = run_blocking(&state, move |engine| Ok(engine.all_metrics(&query))).await?;
    if let Some(processes) = &metrics.processes {
        state.record_pass(&processes.stats);
    }
    Ok(Json(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handlers::tests::test_state;
    use crate::health_stats::HealthStats;
    use crate::state::{build_engine, AppState};
    use std::sync::Arc;

    #[test]
    fn test_process_params_defaults() {
        let query = ProcessParams::default().into_query().unwrap();
        assert_eq!(query.sort_by, SortBy::Cpu);
        assert_eq!(query.limit, 0);
        assert!(query.enable_cpu);
        assert!(!query.merge_children);
        assert!(query.cursor.is_none());
    }

    #[test]
    fn test_process_params_parse_and_reject() {
        let params = ProcessParams {
            sort: Some("Memory".into()),
            limit: Some(10),
            cpu: Some(false),
            merge: Some(true),
            cursor: Some(String::new()),
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.sort_by, SortBy::Memory);
        assert_eq!(query.limit, 10);
        assert!(!query.enable_cpu);
        assert!(query.merge_children);
        assert!(query.cursor.is_none());

        let bad = ProcessParams {
            sort: Some("uptime".into()),
            ..Default::default()
        };
        assert!(matches!(bad.into_query(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_bad_request_maps_to_400() {
        let resp = ApiError::BadRequest("nope".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_processes_handler_on_live_proc() {
        let state = test_state();
        let params = ProcessParams {
            limit: Some(3),
            cpu: Some(false),
            sort: Some("pid".into()),
            ..Default::default()
        };
        let Json(resp) = processes_handler(State(state.clone()), Query(params))
            .await
            .unwrap();
        assert!(!resp.processes.is_empty());
        assert!(resp.processes.len() <= 3);
        assert!(resp.processes.windows(2).all(|w| w[0].pid <= w[1].pid));
        assert!(!resp.cursor.is_empty());
        assert_eq!(state.health_stats.total_passes(), 1);
    }

    #[test]
    fn test_all_params_split_cursors() {
        let params = AllParams {
            limit: Some(1),
            cursor: Some("p".into()),
            cpu_cursor: Some("c".into()),
            disk_cursor: Some(String::new()),
            ..Default::default()
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.processes.limit, 1);
        assert_eq!(query.processes.cursor.as_deref(), Some("p"));
        assert_eq!(query.cpu_cursor.as_deref(), Some("c"));
        assert!(query.disk_cursor.is_none());
    }

    #[tokio::test]
    async fn test_all_handler_on_live_proc() {
        let params = AllParams {
            limit: Some(2),
            cpu: Some(false),
            ..Default::default()
        };
        let Json(metrics) = all_handler(State(test_state()), Query(params))
            .await
            .unwrap();
        assert!(metrics.memory.is_some());
        let processes = metrics.processes.unwrap();
        assert!(processes.processes.len() <= 2);
    }

    #[tokio::test]
    async fn test_memory_handler_on_live_proc() {
        let Json(mem) = memory_handler(State(test_state())).await.unwrap();
        assert!(mem.total_kb > 0);
        assert!(mem.used_percent >= 0.0 && mem.used_percent <= 100.0);
    }

    #[tokio::test]
    async fn test_disk_mounts_handler_on_live_proc() {
        let Json(mounts) = disk_mounts_handler(State(test_state())).await.unwrap();
        for mount in &mounts {
            assert!(mount.device.starts_with("/dev/"));
            assert!(mount.used_kb <= mount.total_kb);
            assert!(mount.used_percent >= 0.0 && mount.used_percent <= 100.0);
        }
    }

    #[tokio::test]
    async fn test_temperatures_handler_without_sensor_tree() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            sys_root: Some(dir.path().to_path_buf()),
            max_workers: Some(1),
            ..Default::default()
        };
        let state = Arc::new(AppState {
            engine: Arc::new(build_engine(&config).unwrap()),
            config: Arc::new(config),
            telemetry: None,
            health_stats: Arc::new(HealthStats::new()),
        });
        let err = temperatures_handler(State(state)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
