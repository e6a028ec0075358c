//! Monitor control API endpoints.
//!
//! Start and stop the proximity monitor, and read what it is reporting.
//! Starting while a run is active and stopping while idle are both no-ops
//! that answer 200 with `started`/`stopped` set to `false`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use beaconlock_core::{MonitorEvent, RunSummary, SupervisorError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::feed::LOG_CAPACITY;
use crate::state::SharedState;

/// Log lines returned when no `limit` is given.
const DEFAULT_LOG_LIMIT: usize = 100;

/// Creates the monitor router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/start", post(start_monitor))
        .route("/stop", post(stop_monitor))
        .route("/status", get(get_status))
        .route("/logs", get(get_logs))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Result of a start request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "started": true,
    "run_id": "0194a3c2-7b1e-7c3a-9d2f-1a2b3c4d5e6f",
    "message": "Monitoring started"
}))]
pub struct StartResponse {
    /// Whether a new run was started.
    #[schema(example = true)]
    pub started: bool,

    /// The new run, or the one already active.
    pub run_id: Uuid,

    /// What happened.
    #[schema(example = "Monitoring started")]
    pub message: String,
}

/// Result of a stop request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "stopped": true,
    "message": "Monitoring stopped",
    "summary": {
        "run_id": "0194a3c2-7b1e-7c3a-9d2f-1a2b3c4d5e6f",
        "started_at_utc": "2025-01-15T03:30:00Z",
        "ended_at_utc": "2025-01-15T03:45:20Z",
        "cycles": 182,
        "exit": "cancelled"
    }
}))]
pub struct StopResponse {
    /// Whether a run was stopped.
    #[schema(example = true)]
    pub stopped: bool,

    /// What happened.
    #[schema(example = "Monitoring stopped")]
    pub message: String,

    /// Summary of the stopped run.
    #[schema(nullable)]
    pub summary: Option<RunSummary>,
}

/// Current monitor state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "running": true,
    "status": "Locking in 10 seconds if device not found",
    "status_at_utc": "2025-01-15T03:30:05Z",
    "last_run": null
}))]
pub struct MonitorStatusResponse {
    /// Whether a run is active.
    #[schema(example = true)]
    pub running: bool,

    /// Latest status summary.
    #[schema(nullable, example = "Locking in 10 seconds if device not found")]
    pub status: Option<String>,

    /// When the latest status was published.
    #[schema(nullable)]
    pub status_at_utc: Option<DateTime<Utc>>,

    /// Summary of the most recently finished run.
    #[schema(nullable)]
    pub last_run: Option<RunSummary>,
}

/// Query parameters for the log endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogsQuery {
    /// Maximum number of lines to return (1-500, default 100).
    #[param(minimum = 1, maximum = 500, example = 100)]
    pub limit: Option<usize>,
}

/// Recent monitor log lines, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogsResponse {
    /// Log lines.
    pub lines: Vec<MonitorEvent>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start monitoring with the staged configuration.
#[utoipa::path(
    post,
    path = "/api/monitor/start",
    tag = "monitor",
    operation_id = "startMonitor",
    summary = "Start monitoring",
    description = "Snapshots the staged configuration and starts a monitor run. \
        If a run is already active nothing changes and `started` is false.",
    responses(
        (status = 200, description = "Run started, or already running", body = StartResponse),
        (status = 422, description = "Staged configuration is invalid", body = crate::api::ErrorResponse)
    )
)]
pub async fn start_monitor(State(state): State<SharedState>) -> ApiResult<Json<StartResponse>> {
    let state_guard = state.read().await;
    let settings = state_guard.config.settings().map_err(ApiError::from)?;

    match state_guard
        .supervisor
        .start_with_actions(settings, state_guard.action_sink())
    {
        Ok(run_id) => {
            info!(%run_id, "Monitoring started via API");
            Ok(Json(StartResponse {
                started: true,
                run_id,
                message: "Monitoring started".to_string(),
            }))
        }
        Err(SupervisorError::AlreadyRunning { run_id }) => Ok(Json(StartResponse {
            started: false,
            run_id,
            message: "Monitoring is already running".to_string(),
        })),
    }
}

/// Stop the active run.
#[utoipa::path(
    post,
    path = "/api/monitor/stop",
    tag = "monitor",
    operation_id = "stopMonitor",
    summary = "Stop monitoring",
    description = "Cancels the active run without locking and waits for it to end. \
        If nothing is running `stopped` is false.",
    responses(
        (status = 200, description = "Run stopped, or nothing to stop", body = StopResponse)
    )
)]
pub async fn stop_monitor(State(state): State<SharedState>) -> Json<StopResponse> {
    // Release the state lock before waiting for the run to wind down.
    let supervisor = Arc::clone(&state.read().await.supervisor);

    Json(match supervisor.stop().await {
        Some(summary) => StopResponse {
            stopped: true,
            message: "Monitoring stopped".to_string(),
            summary: Some(summary),
        },
        None => StopResponse {
            stopped: false,
            message: "Monitoring is not running".to_string(),
            summary: None,
        },
    })
}

/// Get the monitor state.
#[utoipa::path(
    get,
    path = "/api/monitor/status",
    tag = "monitor",
    operation_id = "getMonitorStatus",
    summary = "Get monitor status",
    description = "Returns whether a run is active, the latest status summary, \
        and how the last run ended.",
    responses(
        (status = 200, description = "Status retrieved", body = MonitorStatusResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<MonitorStatusResponse> {
    let state_guard = state.read().await;
    let latest = state_guard.feed.latest_status();

    Json(MonitorStatusResponse {
        running: state_guard.supervisor.is_running(),
        status_at_utc: latest.as_ref().map(|event| event.at_utc),
        status: latest.map(|event| event.message),
        last_run: state_guard.supervisor.last_summary(),
    })
}

/// Get recent log lines.
#[utoipa::path(
    get,
    path = "/api/monitor/logs",
    tag = "monitor",
    operation_id = "getMonitorLogs",
    summary = "Get recent monitor log lines",
    params(LogsQuery),
    responses(
        (status = 200, description = "Log lines retrieved", body = LogsResponse),
        (status = 400, description = "Invalid limit", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_logs(
    State(state): State<SharedState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    if !(1..=LOG_CAPACITY).contains(&limit) {
        return Err(ApiError::BadRequest {
            error_code: "invalid_limit".to_string(),
            message: format!("limit must be between 1 and {LOG_CAPACITY}"),
            problems: Vec::new(),
        });
    }

    let lines = state.read().await.feed.recent_logs(limit);
    Ok(Json(LogsResponse { lines }))
}
