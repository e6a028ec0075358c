//! The scan/decide/act loop.
//!
//! One [`MonitorLoop`] drives one run:
//!
//! 1. Scan for at most `scan_timeout` and look for the target address
//!    (case-insensitive, first match wins, enumeration stops there).
//! 2. Feed the outcome to a fresh [`PresenceTracker`] and forward its
//!    diagnostics and a status summary to the observer.
//! 3. On expiry: notify, then lock, then end the run.
//! 4. Otherwise sleep `scan_interval` and repeat.
//!
//! Cadence is sleep-after-work: the interval is measured from the end of a
//! cycle, so a slow scan delays the next one rather than overlapping it. The
//! first scan starts immediately.
//!
//! Cancellation is observed while sleeping and while a scan is in flight.
//! An interrupted scan is dropped and its result never reaches the tracker,
//! and a cancelled run never calls the action sink.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::action::{lock_notification_body, ActionError, ActionSink, NOTIFICATION_TITLE};
use crate::bluetooth::{addresses_match, BluetoothError, DiscoveredDevice, ScanSource};
use crate::config::MonitorSettings;
use crate::observer::ObserverSink;
use crate::presence::{lock_countdown, Phase, PresenceTracker, ScanOutcome, Severity};
use crate::types::{ExitReason, RunSummary};

/// Extra time a scan may take beyond its own timeout before it is abandoned.
const SCAN_OVERRUN_MARGIN: Duration = Duration::from_secs(5);

/// Upper bound on each action call, whatever the sink does internally.
const ACTION_DEADLINE: Duration = Duration::from_secs(30);

/// Drives scan cycles for one run and reacts to the tracker's decisions.
pub struct MonitorLoop {
    run_id: Uuid,
    settings: Arc<MonitorSettings>,
    scanner: Arc<dyn ScanSource>,
    actions: Arc<dyn ActionSink>,
    observer: Arc<dyn ObserverSink>,
}

impl MonitorLoop {
    /// Create a loop for one run.
    #[must_use]
    pub fn new(
        settings: Arc<MonitorSettings>,
        scanner: Arc<dyn ScanSource>,
        actions: Arc<dyn ActionSink>,
        observer: Arc<dyn ObserverSink>,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            settings,
            scanner,
            actions,
            observer,
        }
    }

    /// Identifier of the run this loop drives.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run until the grace period expires or `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> RunSummary {
        let started_at_utc = Utc::now();
        let settings = &self.settings;
        let mut tracker = PresenceTracker::new(settings.grace_period(), settings.min_rssi());
        let mut cycles = 0_u64;

        info!(
            run_id = %self.run_id,
            target = %settings.target_address(),
            interval_secs = settings.scan_interval().as_secs(),
            grace_secs = settings.grace_period().as_secs(),
            "Monitor started"
        );
        self.observer.on_log(&format!(
            "Bluetooth proximity monitor started for '{}' ({})",
            settings.target_name(),
            settings.target_address()
        ));

        let exit = loop {
            if cancel.is_cancelled() {
                break ExitReason::Cancelled;
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break ExitReason::Cancelled,
                outcome = self.scan_once() => outcome,
            };
            if cancel.is_cancelled() {
                break ExitReason::Cancelled;
            }
            cycles += 1;

            let update = tracker.update(outcome, Instant::now());
            for diagnostic in &update.diagnostics {
                self.observer
                    .on_log_at(diagnostic.severity(), &diagnostic.to_string());
            }

            match update.phase {
                Phase::AwaitingFirstContact => self.observer.on_status("Device not yet detected"),
                Phase::Present => self.observer.on_status("Device nearby"),
                Phase::Grace => {
                    let remaining = update.remaining.unwrap_or_default();
                    self.observer.on_status(&format!(
                        "Locking {} if device not found",
                        lock_countdown(remaining)
                    ));
                }
                Phase::Expired => {
                    self.observer.on_status("Locking screen...");
                    break self.expire().await;
                }
            }
            debug!(run_id = %self.run_id, cycle = cycles, phase = %update.phase, "Cycle complete");

            tokio::select! {
                biased;
                () = cancel.cancelled() => break ExitReason::Cancelled,
                () = tokio::time::sleep(settings.scan_interval()) => {}
            }
        };

        if exit == ExitReason::Cancelled {
            self.observer.on_log("Monitoring stopped.");
            self.observer.on_status("Stopped");
        }
        info!(run_id = %self.run_id, cycles, exit = ?exit, "Monitor finished");

        RunSummary {
            run_id: self.run_id,
            started_at_utc,
            ended_at_utc: Utc::now(),
            cycles,
            exit,
        }
    }

    /// One bounded scan, reduced to an outcome for the target.
    ///
    /// Errors, overruns and panics inside the scanner all become
    /// [`ScanOutcome::ScanFailed`].
    async fn scan_once(&self) -> ScanOutcome {
        let timeout = self.settings.scan_timeout();
        self.observer.on_log("Scanning for nearby BLE devices...");

        let scan = AssertUnwindSafe(self.scanner.discover(timeout)).catch_unwind();
        let result = match tokio::time::timeout(timeout + SCAN_OVERRUN_MARGIN, scan).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(BluetoothError::Internal {
                message: panic_message(panic.as_ref()),
            }),
            Err(_) => Err(BluetoothError::ScanTimeout {
                duration_secs: timeout.as_secs(),
            }),
        };

        match result {
            Ok(devices) => self.find_target(&devices),
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Scan failed");
                ScanOutcome::ScanFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn find_target(&self, devices: &[DiscoveredDevice]) -> ScanOutcome {
        let target = self.settings.target_address();
        devices
            .iter()
            .inspect(|device| {
                self.observer.on_log(&format!(
                    "Found - Name: {}, Address: {}, RSSI: {}",
                    device.display_name(),
                    device.address,
                    device
                        .rssi
                        .map_or_else(|| "n/a".to_string(), |rssi| format!("{rssi} dBm"))
                ));
            })
            .find(|device| addresses_match(&device.address, target))
            .map_or(ScanOutcome::NotFound, |device| ScanOutcome::Found {
                rssi: device.rssi,
            })
    }

    /// Notify, then lock. Runs once per run; the outcome is only logged.
    async fn expire(&self) -> ExitReason {
        warn!(run_id = %self.run_id, "Grace period expired, locking session");

        let body = lock_notification_body(self.settings.target_name());
        if let Err(e) = bounded(self.actions.notify(NOTIFICATION_TITLE, &body)).await {
            warn!(run_id = %self.run_id, error = %e, "Notification failed");
            self.observer
                .on_log_at(Severity::Warning, &format!("Notification failed: {e}"));
        }

        match bounded(self.actions.lock()).await {
            Ok(()) => {
                self.observer.on_log("Screen locked.");
                ExitReason::Locked
            }
            Err(e) => {
                error!(run_id = %self.run_id, error = %e, "Failed to lock session");
                self.observer
                    .on_log_at(Severity::Error, &format!("Failed to lock workstation: {e}"));
                ExitReason::LockFailed
            }
        }
    }
}

async fn bounded(
    action: impl std::future::Future<Output = Result<(), ActionError>>,
) -> Result<(), ActionError> {
    tokio::time::timeout(ACTION_DEADLINE, action)
        .await
        .unwrap_or_else(|_| {
            Err(ActionError::Timeout {
                program: "action".to_string(),
                timeout_secs: ACTION_DEADLINE.as_secs(),
            })
        })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "scanner panicked".to_string())
}
