//! Shared types and OpenAPI schemas.
//!
//! These cross the boundary between a monitor run and whoever is watching
//! it (the headless runner or the HTTP surface).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::presence::Severity;

/// Which channel a [`MonitorEvent`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEventKind {
    /// A log line for the scrolling log view.
    Log,
    /// A short summary replacing the current status line.
    Status,
}

/// One message emitted by a monitor run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "kind": "log",
    "severity": "warning",
    "message": "Signal is weak: -82 dBm (floor -70 dBm)",
    "at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct MonitorEvent {
    /// Log line or status summary.
    pub kind: MonitorEventKind,

    /// How urgent a log line is. Status summaries are always `info`.
    #[serde(default)]
    pub severity: Severity,

    /// Human-readable text.
    #[schema(example = "Signal is weak: -82 dBm (floor -70 dBm)")]
    pub message: String,

    /// When the event was emitted.
    pub at_utc: DateTime<Utc>,
}

impl MonitorEvent {
    /// An informational log event stamped now.
    #[must_use]
    pub fn log(message: impl Into<String>) -> Self {
        Self::log_at(Severity::Info, message)
    }

    /// A log event with the given severity, stamped now.
    #[must_use]
    pub fn log_at(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind: MonitorEventKind::Log,
            severity,
            message: message.into(),
            at_utc: Utc::now(),
        }
    }

    /// A status event stamped now.
    #[must_use]
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            kind: MonitorEventKind::Status,
            severity: Severity::Info,
            message: message.into(),
            at_utc: Utc::now(),
        }
    }
}

/// Why a monitor run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Stopped on request before the grace period ran out.
    Cancelled,
    /// The grace period ran out and the lock command succeeded.
    Locked,
    /// The grace period ran out but the lock command failed.
    LockFailed,
}

impl ExitReason {
    /// Returns `true` if the run ended because the device went missing.
    #[must_use]
    pub const fn expired(self) -> bool {
        matches!(self, Self::Locked | Self::LockFailed)
    }
}

/// Summary of a finished monitor run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "run_id": "0194a3c2-7b1e-7c3a-9d2f-1a2b3c4d5e6f",
    "started_at_utc": "2025-01-15T03:30:00Z",
    "ended_at_utc": "2025-01-15T03:45:20Z",
    "cycles": 182,
    "exit": "locked"
}))]
pub struct RunSummary {
    /// Identifier of the run.
    pub run_id: Uuid,

    /// When the run started.
    pub started_at_utc: DateTime<Utc>,

    /// When the run ended.
    pub ended_at_utc: DateTime<Utc>,

    /// Scan cycles completed.
    #[schema(example = 182)]
    pub cycles: u64,

    /// Why the run ended.
    pub exit: ExitReason,
}
