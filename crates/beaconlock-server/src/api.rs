//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `config` - Staged configuration management
//! - `devices` - One-off Bluetooth device scanning
//! - `health` - Service health checks
//! - `monitor` - Start, stop, and observe the proximity monitor
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;

use crate::state::SharedState;

pub mod config;
pub mod devices;
pub mod error;
pub mod health;
pub mod monitor;
pub mod openapi;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::{get_openapi_json, ApiDoc};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /config            - Staged configuration (GET, PUT)
/// ├── /monitor
/// │   ├── /start         - Start a run
/// │   ├── /stop          - Stop the active run
/// │   ├── /status        - Running flag, latest status, last run
/// │   └── /logs          - Recent log lines
/// ├── /devices           - Bluetooth device scanning
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    health::init_start_time();

    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/devices", get(devices::scan_devices))
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/config", config::router())
                .nest("/monitor", monitor::router()),
        )
        .with_state(state)
}
