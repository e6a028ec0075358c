//! # beaconlock-core
//!
//! Core logic for the beaconlock presence monitor: periodically scan for a
//! paired Bluetooth device and lock the session once it has been gone longer
//! than a grace period.
//!
//! This crate provides:
//! - The presence state machine that turns noisy scan results into a single
//!   lock/no-lock decision
//! - The monitor loop that drives scan cycles and dispatches decisions
//! - Configuration loading, saving, and validation
//! - Bluetooth scanning (BlueZ) and the host lock/notification actions
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`presence`] - `PresenceTracker`, the pure phase/timing policy
//! - [`monitor`] - `MonitorLoop`, the cancellable scan/decide/act cycle
//! - [`supervisor`] - one active monitor at a time, start/stop control
//! - [`bluetooth`] - the `ScanSource` seam and its BlueZ and mock scanners
//! - [`action`] - the `ActionSink` seam: notification and session lock
//! - [`observer`] - the `ObserverSink` seam: log lines and status summaries
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod action;
pub mod bluetooth;
pub mod config;
pub mod error;
pub mod monitor;
pub mod observer;
pub mod presence;
pub mod supervisor;
pub mod types;

// Re-export primary types for convenience
pub use action::{ActionError, ActionSink, CommandActionSink, DryRunActionSink};
#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use bluetooth::MockScanner;
#[cfg(feature = "bluetooth")]
pub use bluetooth::BluetoothScanner;
pub use bluetooth::{addresses_match, BluetoothError, BluetoothResult, DiscoveredDevice, ScanSource};
pub use config::{
    is_valid_mac_address, ActionsConfig, Config, ConfigError, ConfigResult, DeviceConfig,
    MonitorConfig, MonitorSettings, ServerConfig,
};
pub use error::{BeaconLockError, Result};
pub use monitor::MonitorLoop;
pub use observer::{ChannelObserver, FanoutObserver, ObserverSink, TracingObserver};
pub use presence::{Diagnostic, Phase, PresenceTracker, PresenceUpdate, ScanOutcome, Severity};
pub use supervisor::{MonitorSupervisor, SupervisorError};
pub use types::{ExitReason, MonitorEvent, MonitorEventKind, RunSummary};
