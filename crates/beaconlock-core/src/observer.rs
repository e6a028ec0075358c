//! Observer seam for log lines and status summaries.
//!
//! A monitor run pushes two kinds of text outwards: log lines for a
//! scrolling view and status summaries for a single status line. Both calls
//! are fire-and-forget and must never block the loop.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::presence::Severity;
use crate::types::MonitorEvent;

/// Receives log lines and status summaries from a monitor run.
pub trait ObserverSink: Send + Sync {
    /// A line for the log view.
    fn on_log(&self, line: &str);

    /// A short summary replacing the current status.
    fn on_status(&self, summary: &str);

    /// A log line with a severity. Defaults to [`ObserverSink::on_log`].
    fn on_log_at(&self, severity: Severity, line: &str) {
        let _ = severity;
        self.on_log(line);
    }
}

/// Writes everything to `tracing`. Used by the headless runner.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ObserverSink for TracingObserver {
    fn on_log(&self, line: &str) {
        info!(target: "beaconlock::monitor", "{line}");
    }

    fn on_status(&self, summary: &str) {
        info!(target: "beaconlock::status", "{summary}");
    }

    fn on_log_at(&self, severity: Severity, line: &str) {
        match severity {
            Severity::Info => info!(target: "beaconlock::monitor", "{line}"),
            Severity::Warning => warn!(target: "beaconlock::monitor", "{line}"),
            Severity::Error => error!(target: "beaconlock::monitor", "{line}"),
        }
    }
}

/// Publishes [`MonitorEvent`]s on a broadcast channel.
///
/// Sending never blocks. With no receivers the event is dropped; a receiver
/// that falls behind sees `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: broadcast::Sender<MonitorEvent>,
}

impl ChannelObserver {
    /// Create an observer and its channel with room for `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<MonitorEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Another receiver for the same channel.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }
}

impl ObserverSink for ChannelObserver {
    fn on_log(&self, line: &str) {
        let _ = self.sender.send(MonitorEvent::log(line));
    }

    fn on_status(&self, summary: &str) {
        let _ = self.sender.send(MonitorEvent::status(summary));
    }

    fn on_log_at(&self, severity: Severity, line: &str) {
        let _ = self.sender.send(MonitorEvent::log_at(severity, line));
    }
}

/// Forwards every call to each inner observer, in order.
#[derive(Clone, Default)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn ObserverSink>>,
}

impl FanoutObserver {
    /// Create a fan-out over `observers`.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn ObserverSink>>) -> Self {
        Self { observers }
    }
}

impl ObserverSink for FanoutObserver {
    fn on_log(&self, line: &str) {
        for observer in &self.observers {
            observer.on_log(line);
        }
    }

    fn on_status(&self, summary: &str) {
        for observer in &self.observers {
            observer.on_status(summary);
        }
    }

    fn on_log_at(&self, severity: Severity, line: &str) {
        for observer in &self.observers {
            observer.on_log_at(severity, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MonitorEventKind;

    #[test]
    fn test_channel_observer_delivers_in_order() {
        let (observer, mut rx) = ChannelObserver::new(8);
        observer.on_log("scanning");
        observer.on_status("Device nearby");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.kind, MonitorEventKind::Log);
        assert_eq!(first.message, "scanning");

        let second = rx.try_recv().unwrap();
        assert_eq!(second.kind, MonitorEventKind::Status);
        assert_eq!(second.message, "Device nearby");
    }

    #[test]
    fn test_channel_observer_without_receivers_does_not_fail() {
        let (observer, rx) = ChannelObserver::new(1);
        drop(rx);
        observer.on_log("nobody listening");
        observer.on_status("still fine");
    }

    #[test]
    fn test_channel_observer_never_blocks_when_full() {
        let (observer, mut rx) = ChannelObserver::new(2);
        for n in 0..10 {
            observer.on_log(&format!("line {n}"));
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_fanout_reaches_every_observer() {
        let (first, mut first_rx) = ChannelObserver::new(4);
        let (second, mut second_rx) = ChannelObserver::new(4);
        let fanout = FanoutObserver::new(vec![Arc::new(first), Arc::new(second)]);

        fanout.on_log_at(Severity::Warning, "weak signal");

        assert_eq!(first_rx.try_recv().unwrap().message, "weak signal");
        assert_eq!(second_rx.try_recv().unwrap().message, "weak signal");
    }

    #[test]
    fn test_channel_observer_keeps_severity() {
        let (observer, mut rx) = ChannelObserver::new(4);
        observer.on_log_at(Severity::Error, "Failed to lock workstation: exit status 1");
        observer.on_log("Scanning for nearby BLE devices...");

        let failure = rx.try_recv().unwrap();
        assert_eq!(failure.kind, MonitorEventKind::Log);
        assert_eq!(failure.severity, Severity::Error);

        assert_eq!(rx.try_recv().unwrap().severity, Severity::Info);
    }
}
