//! Device scanning endpoint, for picking the device to watch.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use beaconlock_core::DiscoveredDevice;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// How long a one-off scan listens for.
const SCAN_DURATION_SECS: u64 = 10;

/// Device scan response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "devices": [
        {
            "address": "F7:F6:DB:64:91:E8",
            "name": "ColorFit Cadet",
            "rssi": -58
        }
    ],
    "scan_duration_secs": 10,
    "scanned_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct ScanDevicesResponse {
    /// Devices heard, strongest signal first.
    pub devices: Vec<DiscoveredDevice>,

    /// How long the scan listened.
    #[schema(example = 10)]
    pub scan_duration_secs: u64,

    /// When the scan completed.
    pub scanned_at_utc: DateTime<Utc>,
}

/// Scan for nearby Bluetooth devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    operation_id = "scanDevices",
    summary = "Scan for Bluetooth devices",
    description = "Listens for nearby Bluetooth LE devices and lists them, strongest \
        signal first. Use the address of your phone or watch as `device_address`.",
    responses(
        (status = 200, description = "Scan completed", body = ScanDevicesResponse),
        (status = 503, description = "Bluetooth unavailable", body = crate::api::ErrorResponse)
    )
)]
pub async fn scan_devices(State(state): State<SharedState>) -> ApiResult<Json<ScanDevicesResponse>> {
    let scanner = Arc::clone(&state.read().await.scanner);

    let mut devices = scanner
        .discover(Duration::from_secs(SCAN_DURATION_SECS))
        .await?;
    devices.sort_by_key(|device| Reverse(device.rssi));

    Ok(Json(ScanDevicesResponse {
        devices,
        scan_duration_secs: SCAN_DURATION_SECS,
        scanned_at_utc: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_response_serialization() {
        let response = ScanDevicesResponse {
            devices: vec![DiscoveredDevice {
                address: "F7:F6:DB:64:91:E8".to_string(),
                name: Some("ColorFit Cadet".to_string()),
                rssi: Some(-58),
            }],
            scan_duration_secs: 10,
            scanned_at_utc: Utc::now(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("ColorFit Cadet"));
    }
}
