//! Buffered view of monitor events for the HTTP surface.
//!
//! A collector task drains the monitor's broadcast channel into a
//! [`StatusFeed`]: the latest status summary plus a bounded ring of log
//! lines. Handlers only ever read from the feed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use beaconlock_core::{MonitorEvent, MonitorEventKind, Severity};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Log lines kept for `GET /api/monitor/logs`.
pub const LOG_CAPACITY: usize = 500;

#[derive(Debug, Default)]
struct FeedInner {
    logs: VecDeque<MonitorEvent>,
    status: Option<MonitorEvent>,
}

/// Latest status and recent log lines of the monitor.
#[derive(Debug, Default)]
pub struct StatusFeed {
    inner: Mutex<FeedInner>,
}

impl StatusFeed {
    /// Create an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one event.
    pub fn record(&self, event: MonitorEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match event.kind {
            MonitorEventKind::Status => inner.status = Some(event),
            MonitorEventKind::Log => {
                if inner.logs.len() == LOG_CAPACITY {
                    inner.logs.pop_front();
                }
                inner.logs.push_back(event);
            }
        }
    }

    /// The most recent `limit` log lines, oldest first.
    #[must_use]
    pub fn recent_logs(&self, limit: usize) -> Vec<MonitorEvent> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = inner.logs.len().saturating_sub(limit);
        inner.logs.iter().skip(skip).cloned().collect()
    }

    /// The latest status summary, if any was published.
    #[must_use]
    pub fn latest_status(&self) -> Option<MonitorEvent> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
            .clone()
    }

    /// Drain `receiver` into this feed until every sender is gone.
    pub fn spawn_collector(
        self: &Arc<Self>,
        mut receiver: broadcast::Receiver<MonitorEvent>,
    ) -> JoinHandle<()> {
        let feed = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => feed.record(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Monitor event collector fell behind");
                        feed.record(MonitorEvent::log_at(
                            Severity::Warning,
                            format!("({skipped} log lines skipped)"),
                        ));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Monitor event collector stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_replaces_previous() {
        let feed = StatusFeed::new();
        feed.record(MonitorEvent::status("Device nearby"));
        feed.record(MonitorEvent::status("Locking in 10 seconds if device not found"));

        assert_eq!(
            feed.latest_status().unwrap().message,
            "Locking in 10 seconds if device not found"
        );
        assert!(feed.recent_logs(10).is_empty());
    }

    #[test]
    fn test_log_ring_is_bounded() {
        let feed = StatusFeed::new();
        for n in 0..(LOG_CAPACITY + 20) {
            feed.record(MonitorEvent::log(format!("line {n}")));
        }

        let all = feed.recent_logs(usize::MAX);
        assert_eq!(all.len(), LOG_CAPACITY);
        assert_eq!(all[0].message, "line 20");

        let last_two = feed.recent_logs(2);
        assert_eq!(last_two[0].message, format!("line {}", LOG_CAPACITY + 18));
        assert_eq!(last_two[1].message, format!("line {}", LOG_CAPACITY + 19));
    }

    #[tokio::test]
    async fn test_collector_marks_skipped_lines_as_warning() {
        let (sender, receiver) = broadcast::channel(2);
        for n in 0..6 {
            sender.send(MonitorEvent::log(format!("line {n}"))).unwrap();
        }
        drop(sender);

        let feed = Arc::new(StatusFeed::new());
        feed.spawn_collector(receiver).await.unwrap();

        let logs = feed.recent_logs(10);
        assert_eq!(logs[0].message, "(4 log lines skipped)");
        assert_eq!(logs[0].severity, Severity::Warning);
        assert_eq!(logs[1].message, "line 4");
    }

    #[tokio::test]
    async fn test_collector_drains_channel() {
        let (sender, receiver) = broadcast::channel(16);
        let feed = Arc::new(StatusFeed::new());
        let collector = feed.spawn_collector(receiver);

        sender.send(MonitorEvent::log("Scanning...")).unwrap();
        sender
            .send(MonitorEvent::log_at(Severity::Warning, "Signal is weak: -82 dBm (floor -70 dBm)"))
            .unwrap();
        sender.send(MonitorEvent::status("Device nearby")).unwrap();
        drop(sender);
        collector.await.unwrap();

        let logs = feed.recent_logs(10);
        assert_eq!(logs[0].message, "Scanning...");
        assert_eq!(logs[1].severity, Severity::Warning);
        assert_eq!(feed.latest_status().unwrap().message, "Device nearby");
    }
}
