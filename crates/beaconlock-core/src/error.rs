//! Unified error type for the beaconlock core library.
//!
//! Each module keeps its own error enum ([`ConfigError`], [`BluetoothError`],
//! [`ActionError`], [`SupervisorError`]). [`BeaconLockError`] folds them into
//! one type that the server and headless runner can classify and map to
//! HTTP status codes.
//!
//! # Example
//!
//! ```rust
//! use beaconlock_core::error::{BeaconLockError, Result};
//! use beaconlock_core::Config;
//!
//! fn start_settings(config: &Config) -> Result<()> {
//!     config.settings()?;
//!     Ok(())
//! }
//!
//! let err = start_settings(&Config::default()).unwrap_err();
//! assert!(err.is_config_error());
//! assert_eq!(err.http_status_code(), 422);
//! ```
//!
//! [`ConfigError`]: crate::config::ConfigError
//! [`BluetoothError`]: crate::bluetooth::BluetoothError
//! [`ActionError`]: crate::action::ActionError
//! [`SupervisorError`]: crate::supervisor::SupervisorError

use thiserror::Error;
use uuid::Uuid;

/// The unified error type for all beaconlock operations.
#[derive(Debug, Error)]
pub enum BeaconLockError {
    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    BluetoothAdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    BluetoothAdapterPoweredOff,

    /// A Bluetooth scan failed or overran its timeout.
    #[error("Bluetooth scan failed: {0}")]
    BluetoothScanFailed(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration could not be parsed or serialized.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // ACTION ERRORS
    // =========================================================================
    /// The lock or notification command failed.
    #[error("Action failed: {0}")]
    ActionFailed(String),

    // =========================================================================
    // MONITOR ERRORS
    // =========================================================================
    /// A monitor run is already active.
    #[error("Monitoring is already running (run {0})")]
    AlreadyRunning(Uuid),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beaconlock operations.
pub type Result<T> = std::result::Result<T, BeaconLockError>;

impl BeaconLockError {
    /// Returns `true` if this error is related to Bluetooth operations.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(
            self,
            Self::BluetoothAdapterNotFound
                | Self::BluetoothAdapterPoweredOff
                | Self::BluetoothScanFailed(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 409 Conflict - state does not allow the request
            Self::AlreadyRunning(_) => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::ActionFailed(_) | Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 503 Service Unavailable - Bluetooth hardware issues
            Self::BluetoothAdapterNotFound
            | Self::BluetoothAdapterPoweredOff
            | Self::BluetoothScanFailed(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BluetoothAdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::BluetoothAdapterPoweredOff => "BLUETOOTH_ADAPTER_POWERED_OFF",
            Self::BluetoothScanFailed(_) => "BLUETOOTH_SCAN_FAILED",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::ActionFailed(_) => "ACTION_FAILED",
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for BeaconLockError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NoConfigDir => {
                Self::PersistenceError("Could not determine configuration directory".to_string())
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            err @ (ConfigError::ValidationError { .. }
            | ConfigError::MultipleValidationErrors(_)) => {
                Self::ConfigValidationError(err.to_string())
            }
        }
    }
}

impl From<crate::bluetooth::BluetoothError> for BeaconLockError {
    fn from(err: crate::bluetooth::BluetoothError) -> Self {
        use crate::bluetooth::BluetoothError;
        match err {
            BluetoothError::AdapterNotFound => Self::BluetoothAdapterNotFound,
            BluetoothError::AdapterPoweredOff => Self::BluetoothAdapterPoweredOff,
            BluetoothError::ScanTimeout { duration_secs } => {
                Self::BluetoothScanFailed(format!("Scan timed out after {duration_secs} seconds"))
            }
            BluetoothError::SessionInitFailed { message }
            | BluetoothError::DiscoveryFailed { message }
            | BluetoothError::Internal { message } => Self::BluetoothScanFailed(message),
        }
    }
}

impl From<crate::action::ActionError> for BeaconLockError {
    fn from(err: crate::action::ActionError) -> Self {
        Self::ActionFailed(err.to_string())
    }
}

impl From<crate::supervisor::SupervisorError> for BeaconLockError {
    fn from(err: crate::supervisor::SupervisorError) -> Self {
        use crate::supervisor::SupervisorError;
        match err {
            SupervisorError::AlreadyRunning { run_id } => Self::AlreadyRunning(run_id),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use std::io::{Error as IoErr, ErrorKind};

    use super::*;
    use crate::action::ActionError;
    use crate::bluetooth::BluetoothError;
    use crate::config::Config;
    use crate::supervisor::SupervisorError;

    #[test]
    fn test_bluetooth_error_classification() {
        assert!(BeaconLockError::BluetoothAdapterNotFound.is_bluetooth_error());
        assert!(BeaconLockError::BluetoothAdapterPoweredOff.is_bluetooth_error());
        assert!(BeaconLockError::BluetoothScanFailed("busy".into()).is_bluetooth_error());

        assert!(!BeaconLockError::ActionFailed("x".into()).is_bluetooth_error());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(BeaconLockError::ConfigParseError("syntax error".into()).is_config_error());
        assert!(BeaconLockError::ConfigValidationError("bad value".into()).is_config_error());

        assert!(!BeaconLockError::BluetoothAdapterNotFound.is_config_error());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(
            BeaconLockError::AlreadyRunning(Uuid::nil()).http_status_code(),
            409
        );
        assert_eq!(
            BeaconLockError::ConfigValidationError("bad".into()).http_status_code(),
            422
        );
        assert_eq!(
            BeaconLockError::ActionFailed("exit 1".into()).http_status_code(),
            500
        );
        assert_eq!(
            BeaconLockError::BluetoothAdapterPoweredOff.http_status_code(),
            503
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BeaconLockError::BluetoothAdapterNotFound.error_code(),
            "BLUETOOTH_ADAPTER_NOT_FOUND"
        );
        assert_eq!(
            BeaconLockError::AlreadyRunning(Uuid::nil()).error_code(),
            "ALREADY_RUNNING"
        );
    }

    #[test]
    fn test_from_config_validation_errors() {
        let err: BeaconLockError = Config::default().validate().unwrap_err().into();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("device.address"));
    }

    #[test]
    fn test_from_bluetooth_error() {
        let err: BeaconLockError = BluetoothError::ScanTimeout { duration_secs: 5 }.into();
        assert!(err.is_bluetooth_error());
        assert!(err.to_string().contains("5 seconds"));

        let err: BeaconLockError = BluetoothError::AdapterPoweredOff.into();
        assert!(matches!(err, BeaconLockError::BluetoothAdapterPoweredOff));
    }

    #[test]
    fn test_from_action_and_supervisor_errors() {
        let err: BeaconLockError = ActionError::EmptyCommand.into();
        assert!(matches!(err, BeaconLockError::ActionFailed(_)));
        assert_eq!(err.http_status_code(), 500);

        let run_id = Uuid::now_v7();
        let err: BeaconLockError = SupervisorError::AlreadyRunning { run_id }.into();
        assert!(matches!(err, BeaconLockError::AlreadyRunning(id) if id == run_id));
    }

    #[test]
    fn test_from_io_error() {
        let err: BeaconLockError = IoErr::new(ErrorKind::NotFound, "file not found").into();
        assert!(err.is_io_error());

        let err: BeaconLockError = crate::config::ConfigError::NoConfigDir.into();
        assert!(err.is_io_error());
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BeaconLockError>();
        assert_sync::<BeaconLockError>();
    }
}
