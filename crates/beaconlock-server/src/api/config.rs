//! Configuration API endpoints.
//!
//! The server holds a staged [`Config`]. Edits are validated, saved to disk,
//! and only take effect when the next monitor run starts.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use beaconlock_core::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the config router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(get_config).put(update_config))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current staged configuration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "device_name": "ColorFit Cadet",
    "device_address": "F7:F6:DB:64:91:E8",
    "is_configured": true,
    "scan_interval_secs": 5,
    "grace_period_secs": 15,
    "scan_timeout_secs": 5,
    "min_rssi": -70,
    "notify": true,
    "dry_run": false,
    "lock_command": null,
    "problems": []
}))]
pub struct ConfigResponse {
    /// Display label of the watched device.
    #[schema(example = "ColorFit Cadet")]
    pub device_name: String,

    /// Bluetooth address of the watched device.
    #[schema(example = "F7:F6:DB:64:91:E8")]
    pub device_address: String,

    /// Whether a real device has been configured (not the placeholder).
    #[schema(example = true)]
    pub is_configured: bool,

    /// Seconds between the end of one scan cycle and the next.
    #[schema(example = 5)]
    pub scan_interval_secs: u64,

    /// Seconds the device may go unseen before the session locks.
    #[schema(example = 15)]
    pub grace_period_secs: u64,

    /// Seconds each scan listens for.
    #[schema(example = 5)]
    pub scan_timeout_secs: u64,

    /// Signal floor in dBm below which a sighting is logged as weak.
    #[schema(example = -70)]
    pub min_rssi: i16,

    /// Whether a notification is shown before locking.
    #[schema(example = true)]
    pub notify: bool,

    /// Whether lock and notification are only logged.
    #[schema(example = false)]
    pub dry_run: bool,

    /// Custom lock command, if any.
    #[schema(nullable)]
    pub lock_command: Option<Vec<String>>,

    /// Reasons the monitor cannot start with this configuration.
    pub problems: Vec<String>,
}

impl From<&Config> for ConfigResponse {
    fn from(config: &Config) -> Self {
        Self {
            device_name: config.device.name.clone(),
            device_address: config.device.address.clone(),
            is_configured: config.is_device_configured(),
            scan_interval_secs: config.monitor.scan_interval_secs,
            grace_period_secs: config.monitor.grace_period_secs,
            scan_timeout_secs: config.monitor.scan_timeout_secs,
            min_rssi: config.monitor.min_rssi,
            notify: config.actions.notify,
            dry_run: config.actions.dry_run,
            lock_command: config.actions.lock_command.clone(),
            problems: config
                .validation_errors()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Partial update of the staged configuration. Omitted fields are kept.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[schema(example = json!({
    "device_name": "ColorFit Cadet",
    "device_address": "F7:F6:DB:64:91:E8",
    "grace_period_secs": 30
}))]
pub struct UpdateConfigRequest {
    /// Display label of the watched device.
    pub device_name: Option<String>,
    /// Bluetooth address (XX:XX:XX:XX:XX:XX).
    pub device_address: Option<String>,
    /// Seconds between scan cycles.
    pub scan_interval_secs: Option<u64>,
    /// Grace period in seconds.
    pub grace_period_secs: Option<u64>,
    /// Scan window in seconds; must not exceed the interval.
    pub scan_timeout_secs: Option<u64>,
    /// Weak-signal floor in dBm.
    pub min_rssi: Option<i16>,
    /// Show a notification before locking.
    pub notify: Option<bool>,
    /// Only log lock and notification.
    pub dry_run: Option<bool>,
    /// Custom lock command.
    pub lock_command: Option<Vec<String>>,
}

impl UpdateConfigRequest {
    /// Apply the present fields, returning the dotted names of those touched.
    fn apply(self, config: &mut Config) -> Vec<&'static str> {
        let mut touched = Vec::new();
        if let Some(name) = self.device_name {
            config.device.name = name.trim().to_string();
            touched.push("device.name");
        }
        if let Some(address) = self.device_address {
            config.device.address = address.trim().to_ascii_uppercase();
            touched.push("device.address");
        }
        if let Some(secs) = self.scan_interval_secs {
            config.monitor.scan_interval_secs = secs;
            touched.push("monitor.scan_interval_secs");
        }
        if let Some(secs) = self.grace_period_secs {
            config.monitor.grace_period_secs = secs;
            touched.push("monitor.grace_period_secs");
        }
        if let Some(secs) = self.scan_timeout_secs {
            config.monitor.scan_timeout_secs = secs;
            touched.push("monitor.scan_timeout_secs");
        }
        if let Some(rssi) = self.min_rssi {
            config.monitor.min_rssi = rssi;
            touched.push("monitor.min_rssi");
        }
        if let Some(notify) = self.notify {
            config.actions.notify = notify;
            touched.push("actions.notify");
        }
        if let Some(dry_run) = self.dry_run {
            config.actions.dry_run = dry_run;
            touched.push("actions.dry_run");
        }
        if let Some(command) = self.lock_command {
            config.actions.lock_command = Some(command);
            touched.push("actions.lock_command");
        }
        touched
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the staged configuration.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get staged configuration",
    description = "Returns the staged configuration together with every reason \
        it cannot currently start a monitor run.",
    responses(
        (status = 200, description = "Configuration retrieved", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    Json(ConfigResponse::from(&state.read().await.config))
}

/// Update the staged configuration.
#[utoipa::path(
    put,
    path = "/api/config",
    tag = "config",
    operation_id = "updateConfig",
    summary = "Update staged configuration",
    description = "Applies the given fields to the staged configuration and saves it. \
        Only the fields in the request are validated, so a partially configured \
        system can be filled in step by step. Changes apply to the next run.",
    request_body = UpdateConfigRequest,
    responses(
        (status = 200, description = "Configuration updated", body = ConfigResponse),
        (status = 400, description = "A provided value is invalid", body = crate::api::ErrorResponse),
        (status = 500, description = "Configuration could not be saved", body = crate::api::ErrorResponse)
    )
)]
pub async fn update_config(
    State(state): State<SharedState>,
    Json(request): Json<UpdateConfigRequest>,
) -> ApiResult<Json<ConfigResponse>> {
    let mut state_guard = state.write().await;

    let mut candidate = state_guard.config.clone();
    let touched = request.apply(&mut candidate);

    let problems: Vec<String> = candidate
        .validation_errors()
        .iter()
        .filter(|err| matches!(err, ConfigError::ValidationError { field, .. } if touched.contains(&field.as_str())))
        .map(ToString::to_string)
        .collect();
    if !problems.is_empty() {
        return Err(ApiError::BadRequest {
            error_code: "invalid_config_value".to_string(),
            message: problems.join("; "),
            problems,
        });
    }

    state_guard.config = candidate;
    state_guard.save_config().map_err(|e| ApiError::InternalError {
        error_code: "config_save_failed".to_string(),
        message: "Failed to save configuration".to_string(),
        details: Some(e.to_string()),
    })?;

    Ok(Json(ConfigResponse::from(&state_guard.config)))
}
