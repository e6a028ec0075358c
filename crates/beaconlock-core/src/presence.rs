//! Presence state machine.
//!
//! [`PresenceTracker`] turns one scan result per cycle into a phase:
//!
//! | Current phase        | Found     | Missed, elapsed <= grace | Missed, elapsed > grace |
//! |----------------------|-----------|--------------------------|-------------------------|
//! | AwaitingFirstContact | Present   | AwaitingFirstContact     | AwaitingFirstContact    |
//! | Present              | Present   | Grace                    | Expired                 |
//! | Grace                | Present   | Grace                    | Expired                 |
//! | Expired              | terminal  | terminal                 | terminal                |
//!
//! "Missed" covers both an empty scan and a failed one. Absence is measured
//! from the timestamp of the last sighting, never by counting misses, so a
//! failed scan neither extends nor shortens the grace window.
//!
//! The tracker performs no I/O and cannot fail.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use utoipa::ToSchema;

/// What one scan cycle observed about the watched device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The device was heard, with its signal strength if reported.
    Found {
        /// RSSI in dBm.
        rssi: Option<i16>,
    },
    /// The scan completed without hearing the device.
    NotFound,
    /// The scan failed. Counts as "not heard" for timing.
    ScanFailed {
        /// Why the scan failed.
        reason: String,
    },
}

/// Presence classification of the watched device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not heard yet during this run. Never leads to a lock by itself.
    AwaitingFirstContact,
    /// Heard on the latest cycle.
    Present,
    /// Missing, but for no longer than the grace period.
    Grace,
    /// Missing for longer than the grace period. Terminal.
    Expired,
}

impl Phase {
    /// Returns `true` once the run has to end.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AwaitingFirstContact => "awaiting first contact",
            Self::Present => "present",
            Self::Grace => "grace",
            Self::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// Severity a diagnostic should be logged at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Normal operation.
    #[default]
    Info,
    /// Something the user may want to act on.
    Warning,
    /// A failure.
    Error,
}

/// A per-cycle observation worth logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The device was heard.
    Detected {
        /// RSSI in dBm.
        rssi: Option<i16>,
    },
    /// The device was heard below the configured signal floor.
    WeakSignal {
        /// RSSI in dBm.
        rssi: i16,
        /// Configured floor in dBm.
        min_rssi: i16,
    },
    /// The scan failed; the cycle counts as a miss.
    ScanFailed {
        /// Why the scan failed.
        reason: String,
    },
    /// The device has not been heard at all during this run.
    NotYetDetected,
    /// The device is missing but still within the grace period.
    Missing {
        /// Time left before the lock, never negative.
        remaining: Duration,
    },
    /// The grace period ran out.
    Expired {
        /// Time since the last sighting.
        elapsed: Duration,
    },
}

impl Diagnostic {
    /// Log level for this diagnostic.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Detected { .. } => Severity::Info,
            Self::WeakSignal { .. } | Self::NotYetDetected | Self::Missing { .. } | Self::Expired { .. } => {
                Severity::Warning
            }
            Self::ScanFailed { .. } => Severity::Error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detected { rssi: Some(rssi) } => {
                write!(f, "Target device detected - RSSI: {rssi} dBm")
            }
            Self::Detected { rssi: None } => f.write_str("Target device detected"),
            Self::WeakSignal { rssi, min_rssi } => {
                write!(f, "Signal is weak: {rssi} dBm (floor {min_rssi} dBm)")
            }
            Self::ScanFailed { reason } => write!(f, "Scan error: {reason}"),
            Self::NotYetDetected => {
                f.write_str("Device not detected yet. Waiting for first connection...")
            }
            Self::Missing { remaining } => write!(
                f,
                "Device not seen. Locking {} if still not found.",
                lock_countdown(*remaining)
            ),
            Self::Expired { elapsed } => write!(
                f,
                "Device not seen for {} seconds. Locking screen...",
                elapsed.as_secs()
            ),
        }
    }
}

/// When the lock will happen, for status and log text: "in N seconds", or
/// "on the next scan" when the window is exactly used up (`elapsed == grace`
/// is still Grace; the next miss expires).
#[must_use]
pub fn lock_countdown(remaining: Duration) -> String {
    match whole_seconds_left(remaining) {
        0 => "on the next scan".to_string(),
        1 => "in 1 second".to_string(),
        secs => format!("in {secs} seconds"),
    }
}

/// Seconds left, rounded up so a non-zero remainder never reads as zero.
#[must_use]
pub fn whole_seconds_left(remaining: Duration) -> u64 {
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Result of one [`PresenceTracker::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceUpdate {
    /// Phase after this cycle.
    pub phase: Phase,
    /// Time left before the lock; set only in [`Phase::Grace`].
    pub remaining: Option<Duration>,
    /// What to log for this cycle, in order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Tracks the last sighting of the watched device and classifies each cycle.
///
/// Owned by exactly one monitor loop and discarded with it.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    grace_period: Duration,
    min_rssi: i16,
    last_seen_at: Option<Instant>,
    phase: Phase,
}

impl PresenceTracker {
    /// Create a tracker for one run.
    ///
    /// `grace_period` must be non-zero; [`crate::config::MonitorSettings`]
    /// guarantees it.
    #[must_use]
    pub const fn new(grace_period: Duration, min_rssi: i16) -> Self {
        Self {
            grace_period,
            min_rssi,
            last_seen_at: None,
            phase: Phase::AwaitingFirstContact,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// When the device was last heard, if ever.
    #[must_use]
    pub const fn last_seen_at(&self) -> Option<Instant> {
        self.last_seen_at
    }

    /// Fold one cycle's outcome observed at `now` into the state.
    ///
    /// Once [`Phase::Expired`] has been returned the tracker is spent: later
    /// calls return `Expired` again with no diagnostics and change nothing.
    pub fn update(&mut self, outcome: ScanOutcome, now: Instant) -> PresenceUpdate {
        if self.phase.is_terminal() {
            return PresenceUpdate {
                phase: Phase::Expired,
                remaining: None,
                diagnostics: Vec::new(),
            };
        }

        let mut diagnostics = Vec::new();

        match outcome {
            ScanOutcome::Found { rssi } => {
                self.last_seen_at = Some(now);
                self.phase = Phase::Present;
                diagnostics.push(Diagnostic::Detected { rssi });
                if let Some(rssi) = rssi.filter(|rssi| *rssi < self.min_rssi) {
                    diagnostics.push(Diagnostic::WeakSignal {
                        rssi,
                        min_rssi: self.min_rssi,
                    });
                }
                return PresenceUpdate {
                    phase: self.phase,
                    remaining: None,
                    diagnostics,
                };
            }
            ScanOutcome::ScanFailed { reason } => {
                diagnostics.push(Diagnostic::ScanFailed { reason });
            }
            ScanOutcome::NotFound => {}
        }

        let Some(last_seen_at) = self.last_seen_at else {
            diagnostics.push(Diagnostic::NotYetDetected);
            return PresenceUpdate {
                phase: self.phase,
                remaining: None,
                diagnostics,
            };
        };

        let elapsed = now.saturating_duration_since(last_seen_at);
        if elapsed > self.grace_period {
            self.phase = Phase::Expired;
            diagnostics.push(Diagnostic::Expired { elapsed });
            return PresenceUpdate {
                phase: self.phase,
                remaining: None,
                diagnostics,
            };
        }

        let remaining = self.grace_period - elapsed;
        self.phase = Phase::Grace;
        diagnostics.push(Diagnostic::Missing { remaining });
        PresenceUpdate {
            phase: self.phase,
            remaining: Some(remaining),
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(15);
    const MIN_RSSI: i16 = -70;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn found(rssi: i16) -> ScanOutcome {
        ScanOutcome::Found { rssi: Some(rssi) }
    }

    fn failed() -> ScanOutcome {
        ScanOutcome::ScanFailed {
            reason: "adapter busy".to_string(),
        }
    }

    #[test]
    fn test_scenario_a_grace_then_expiry() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(GRACE, MIN_RSSI);

        let update = tracker.update(found(-50), t0);
        assert_eq!(update.phase, Phase::Present);

        let update = tracker.update(ScanOutcome::NotFound, t0 + secs(5));
        assert_eq!(update.phase, Phase::Grace);
        assert_eq!(update.remaining, Some(secs(10)));

        let update = tracker.update(ScanOutcome::NotFound, t0 + secs(10));
        assert_eq!(update.phase, Phase::Grace);
        assert_eq!(update.remaining, Some(secs(5)));

        let update = tracker.update(ScanOutcome::NotFound, t0 + secs(16));
        assert_eq!(update.phase, Phase::Expired);
        assert!(matches!(
            update.diagnostics.last(),
            Some(Diagnostic::Expired { elapsed }) if *elapsed == secs(16)
        ));
    }

    #[test]
    fn test_scenario_b_never_found_never_expires() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(GRACE, MIN_RSSI);

        for cycle in 0..100 {
            let outcome = if cycle % 3 == 0 {
                failed()
            } else {
                ScanOutcome::NotFound
            };
            let update = tracker.update(outcome, t0 + secs(cycle * 5));
            assert_eq!(update.phase, Phase::AwaitingFirstContact);
            assert!(update.diagnostics.contains(&Diagnostic::NotYetDetected));
        }
        assert_eq!(tracker.last_seen_at(), None);
    }

    #[test]
    fn test_scenario_c_failures_within_grace_then_found() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(GRACE, MIN_RSSI);
        tracker.update(found(-50), t0);

        for n in 1..=3 {
            let update = tracker.update(failed(), t0 + secs(n * 4));
            assert_eq!(update.phase, Phase::Grace);
        }

        let update = tracker.update(found(-55), t0 + secs(14));
        assert_eq!(update.phase, Phase::Present);
        assert_eq!(tracker.last_seen_at(), Some(t0 + secs(14)));

        // Grace restarts from the new sighting.
        let update = tracker.update(ScanOutcome::NotFound, t0 + secs(20));
        assert_eq!(update.phase, Phase::Grace);
        assert_eq!(update.remaining, Some(secs(9)));
    }

    #[test]
    fn test_scan_failure_is_transparent_to_timing() {
        let t0 = Instant::now();
        let mut with_failure = PresenceTracker::new(GRACE, MIN_RSSI);
        let mut without_failure = PresenceTracker::new(GRACE, MIN_RSSI);
        with_failure.update(found(-50), t0);
        without_failure.update(found(-50), t0);

        let failed_update = with_failure.update(failed(), t0 + secs(5));
        let missed_update = without_failure.update(ScanOutcome::NotFound, t0 + secs(5));
        assert_eq!(failed_update.phase, missed_update.phase);
        assert_eq!(failed_update.remaining, missed_update.remaining);

        // The diagnostics still tell the two apart.
        assert!(matches!(
            failed_update.diagnostics[0],
            Diagnostic::ScanFailed { .. }
        ));
        assert!(!missed_update
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::ScanFailed { .. })));
    }

    #[test]
    fn test_single_failure_then_found_does_not_expire() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(GRACE, MIN_RSSI);
        tracker.update(found(-50), t0);

        assert_eq!(tracker.update(failed(), t0 + secs(5)).phase, Phase::Grace);
        assert_eq!(tracker.update(found(-50), t0 + secs(10)).phase, Phase::Present);
    }

    #[test]
    fn test_remaining_strictly_decreases_and_stays_positive() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(GRACE, MIN_RSSI);
        tracker.update(found(-50), t0);

        let mut previous = GRACE;
        let mut offset = Duration::ZERO;
        loop {
            offset += Duration::from_millis(2_300);
            let update = tracker.update(ScanOutcome::NotFound, t0 + offset);
            if update.phase == Phase::Expired {
                break;
            }
            let remaining = update.remaining.unwrap();
            assert!(remaining > Duration::ZERO);
            assert!(remaining < previous);
            previous = remaining;
        }
        assert!(offset > GRACE);
    }

    #[test]
    fn test_weak_signal_is_still_present() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(GRACE, MIN_RSSI);

        let update = tracker.update(found(-90), t0);
        assert_eq!(update.phase, Phase::Present);
        assert!(update.diagnostics.contains(&Diagnostic::WeakSignal {
            rssi: -90,
            min_rssi: MIN_RSSI
        }));

        let update = tracker.update(found(-70), t0 + secs(5));
        assert!(!update
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::WeakSignal { .. })));
    }

    #[test]
    fn test_boundary_elapsed_equal_to_grace_is_grace() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(GRACE, MIN_RSSI);
        tracker.update(found(-50), t0);

        let update = tracker.update(ScanOutcome::NotFound, t0 + GRACE);
        assert_eq!(update.phase, Phase::Grace);
        assert_eq!(update.remaining, Some(Duration::ZERO));

        let update = tracker.update(ScanOutcome::NotFound, t0 + GRACE + Duration::from_millis(1));
        assert_eq!(update.phase, Phase::Expired);
    }

    #[test]
    fn test_expired_is_terminal_and_fires_once() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(GRACE, MIN_RSSI);
        tracker.update(found(-50), t0);

        let first = tracker.update(ScanOutcome::NotFound, t0 + secs(20));
        assert_eq!(first.phase, Phase::Expired);
        assert!(!first.diagnostics.is_empty());

        let again = tracker.update(found(-40), t0 + secs(25));
        assert_eq!(again.phase, Phase::Expired);
        assert!(again.diagnostics.is_empty());
        assert_eq!(tracker.last_seen_at(), Some(t0));
    }

    #[test]
    fn test_expiry_from_present_without_grace_cycle() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(GRACE, MIN_RSSI);
        tracker.update(found(-50), t0);

        let update = tracker.update(failed(), t0 + secs(60));
        assert_eq!(update.phase, Phase::Expired);
    }

    #[test]
    fn test_lock_countdown_never_reads_zero_seconds() {
        assert_eq!(lock_countdown(secs(10)), "in 10 seconds");
        assert_eq!(lock_countdown(Duration::from_millis(200)), "in 1 second");
        assert_eq!(lock_countdown(Duration::ZERO), "on the next scan");
    }

    #[test]
    fn test_grace_boundary_reports_next_scan() {
        let t0 = Instant::now();
        let mut tracker = PresenceTracker::new(GRACE, MIN_RSSI);
        tracker.update(found(-50), t0);

        let update = tracker.update(ScanOutcome::NotFound, t0 + GRACE);
        assert_eq!(update.phase, Phase::Grace);
        assert_eq!(update.remaining, Some(Duration::ZERO));
        assert!(update
            .diagnostics
            .iter()
            .any(|d| d.to_string().contains("Locking on the next scan")));
    }

    #[test]
    fn test_diagnostic_messages() {
        let missing = Diagnostic::Missing {
            remaining: Duration::from_millis(9_200),
        };
        assert!(missing.to_string().contains("Locking in 10 seconds"));
        assert_eq!(missing.severity(), Severity::Warning);

        let used_up = Diagnostic::Missing {
            remaining: Duration::ZERO,
        };
        assert_eq!(
            used_up.to_string(),
            "Device not seen. Locking on the next scan if still not found."
        );

        let failed = Diagnostic::ScanFailed {
            reason: "adapter busy".to_string(),
        };
        assert!(failed.to_string().contains("adapter busy"));
        assert_eq!(failed.severity(), Severity::Error);
    }

    #[test]
    fn test_whole_seconds_left_rounds_up() {
        assert_eq!(whole_seconds_left(secs(10)), 10);
        assert_eq!(whole_seconds_left(Duration::from_millis(4_001)), 5);
        assert_eq!(whole_seconds_left(Duration::ZERO), 0);
    }
}
