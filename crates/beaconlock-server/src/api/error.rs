//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use beaconlock_core::{BeaconLockError, BluetoothError, ConfigError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Individual problems, if there were several.
        problems: Vec<String>,
    },

    /// 409 Conflict - Operation cannot be completed due to current state.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 422 Unprocessable Entity - The staged configuration cannot be used.
    UnprocessableEntity {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Individual problems, if there were several.
        problems: Vec<String>,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details.
        details: Option<String>,
    },

    /// 503 Service Unavailable - The Bluetooth adapter is unavailable.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "config_validation_error",
    "message": "Configuration validation failed: device.address: must not be empty",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "config_validation_error").
    #[schema(example = "config_validation_error")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Configuration validation failed: device.address: must not be empty")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

fn problems_json(problems: Vec<String>) -> Option<serde_json::Value> {
    (!problems.is_empty()).then(|| serde_json::json!({ "problems": problems }))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::BadRequest {
                error_code,
                message,
                problems,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: problems_json(problems),
                },
            ),

            Self::Conflict {
                error_code,
                message,
            } => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::UnprocessableEntity {
                error_code,
                message,
                problems,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: problems_json(problems),
                },
            ),

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: error_code,
                        message,
                        details: details.map(|d| serde_json::json!(d)),
                    },
                )
            }

            Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(|d| serde_json::json!(d)),
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::UnprocessableEntity { message, .. } => {
                write!(f, "Unprocessable Entity: {message}")
            }
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// Split a configuration error into its individual problems.
pub fn config_problems(err: &ConfigError) -> Vec<String> {
    match err {
        ConfigError::MultipleValidationErrors(errors) => {
            errors.iter().map(ToString::to_string).collect()
        }
        other => vec![other.to_string()],
    }
}

/// Convert from beaconlock_core errors.
impl From<BeaconLockError> for ApiError {
    fn from(err: BeaconLockError) -> Self {
        let error_code = err.error_code().to_ascii_lowercase();
        let message = err.to_string();

        match err.http_status_code() {
            409 => Self::Conflict {
                error_code,
                message,
            },
            422 => Self::UnprocessableEntity {
                error_code,
                message,
                problems: Vec::new(),
            },
            503 => Self::ServiceUnavailable {
                error_code,
                message,
                details: None,
            },
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        let problems = if err.is_validation() {
            config_problems(&err)
        } else {
            Vec::new()
        };
        match Self::from(BeaconLockError::from(err)) {
            Self::UnprocessableEntity {
                error_code,
                message,
                ..
            } => Self::UnprocessableEntity {
                error_code,
                message,
                problems,
            },
            other => other,
        }
    }
}

impl From<BluetoothError> for ApiError {
    fn from(err: BluetoothError) -> Self {
        Self::from(BeaconLockError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use beaconlock_core::Config;

    use super::*;

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::BadRequest {
            error_code: "test_error".to_string(),
            message: "Test message".to_string(),
            problems: Vec::new(),
        };
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }

    #[test]
    fn test_invalid_config_maps_to_unprocessable() {
        let err = ApiError::from(Config::default().validate().unwrap_err());
        match err {
            ApiError::UnprocessableEntity {
                error_code,
                problems,
                ..
            } => {
                assert_eq!(error_code, "config_validation_error");
                assert!(!problems.is_empty());
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn test_bluetooth_errors_map_to_service_unavailable() {
        let err = ApiError::from(BluetoothError::AdapterNotFound);
        assert!(matches!(err, ApiError::ServiceUnavailable { .. }));
    }
}
