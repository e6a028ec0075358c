//! OpenAPI specification for the beaconlock API.

use axum::Json;
use beaconlock_core::{
    DiscoveredDevice, ExitReason, MonitorEvent, MonitorEventKind, RunSummary, Severity,
};
use utoipa::OpenApi;

use super::config::{ConfigResponse, UpdateConfigRequest};
use super::devices::ScanDevicesResponse;
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::monitor::{LogsResponse, MonitorStatusResponse, StartResponse, StopResponse};

/// Serve the OpenAPI specification as JSON at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// The OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for beaconlock.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "beaconlock API",
        version = "0.1.0",
        description = r#"
# beaconlock API

beaconlock locks your session when your phone or watch walks away.

## Overview

A monitor scans for one Bluetooth LE device on a fixed cadence. While the
device keeps being heard nothing happens. Once it has gone unheard for longer
than the grace period, a notification is shown and the session is locked.

1. **Configure**: pick the device with `GET /api/devices`, then `PUT /api/config`
2. **Start**: `POST /api/monitor/start` snapshots the configuration into a run
3. **Watch**: `GET /api/monitor/status` and `GET /api/monitor/logs`
4. **Stop**: `POST /api/monitor/stop` ends the run without locking

Configuration edits only apply to the next run.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local beaconlock server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "config", description = "Watched device, scan cadence, grace period, and lock actions"),
        (name = "monitor", description = "Start, stop, and observe the proximity monitor"),
        (name = "devices", description = "Bluetooth device scanning for picking the watched device")
    ),
    paths(
        super::health::health_check,
        super::config::get_config,
        super::config::update_config,
        super::monitor::start_monitor,
        super::monitor::stop_monitor,
        super::monitor::get_status,
        super::monitor::get_logs,
        super::devices::scan_devices,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            ConfigResponse,
            UpdateConfigRequest,
            StartResponse,
            StopResponse,
            MonitorStatusResponse,
            LogsResponse,
            MonitorEvent,
            MonitorEventKind,
            Severity,
            RunSummary,
            ExitReason,
            DiscoveredDevice,
            ScanDevicesResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "beaconlock API");
        assert!(spec.paths.paths.contains_key("/api/monitor/start"));
        assert!(spec.paths.paths.contains_key("/api/config"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"beaconlock API\""));
    }
}
