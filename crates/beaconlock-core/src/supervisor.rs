//! At most one active monitor run, with start/stop control.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::action::ActionSink;
use crate::bluetooth::ScanSource;
use crate::config::MonitorSettings;
use crate::monitor::MonitorLoop;
use crate::observer::ObserverSink;
use crate::types::RunSummary;

/// Errors from [`MonitorSupervisor`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SupervisorError {
    /// A run is still active; stop it first.
    #[error("Monitoring is already running (run {run_id})")]
    AlreadyRunning {
        /// The active run.
        run_id: Uuid,
    },
}

struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<RunSummary>,
}

/// What occupies the single run slot.
enum Slot {
    Running(ActiveRun),
    /// Cancelled, but the task has not finished winding down. Still counts
    /// as active so a new run cannot overlap it.
    Stopping { run_id: Uuid, task: AbortHandle },
}

impl Slot {
    const fn run_id(&self) -> Uuid {
        match self {
            Self::Running(run) => run.run_id,
            Self::Stopping { run_id, .. } => *run_id,
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Self::Running(run) => !run.handle.is_finished(),
            Self::Stopping { task, .. } => !task.is_finished(),
        }
    }
}

/// Owns the collaborators of a monitor run and at most one active run.
///
/// A run that ended on its own (grace period expired) no longer counts as
/// active, so `start` may be called again right away. A run being stopped
/// counts as active until its task has finished.
pub struct MonitorSupervisor {
    scanner: Arc<dyn ScanSource>,
    actions: Arc<dyn ActionSink>,
    observer: Arc<dyn ObserverSink>,
    active: Mutex<Option<Slot>>,
    last_summary: Arc<Mutex<Option<RunSummary>>>,
}

impl MonitorSupervisor {
    /// Create an idle supervisor.
    #[must_use]
    pub fn new(
        scanner: Arc<dyn ScanSource>,
        actions: Arc<dyn ActionSink>,
        observer: Arc<dyn ObserverSink>,
    ) -> Self {
        Self {
            scanner,
            actions,
            observer,
            active: Mutex::new(None),
            last_summary: Arc::new(Mutex::new(None)),
        }
    }

    /// Start a run with the supervisor's own action sink.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::AlreadyRunning`] while a run is active.
    pub fn start(&self, settings: MonitorSettings) -> Result<Uuid, SupervisorError> {
        self.start_with_actions(settings, Arc::clone(&self.actions))
    }

    /// Start a run that uses `actions` instead of the default sink.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::AlreadyRunning`] while a run is active.
    pub fn start_with_actions(
        &self,
        settings: MonitorSettings,
        actions: Arc<dyn ActionSink>,
    ) -> Result<Uuid, SupervisorError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = active.as_ref().filter(|slot| slot.is_live()) {
            return Err(SupervisorError::AlreadyRunning {
                run_id: slot.run_id(),
            });
        }

        let monitor = MonitorLoop::new(
            Arc::new(settings),
            Arc::clone(&self.scanner),
            actions,
            Arc::clone(&self.observer),
        );
        let run_id = monitor.run_id();
        let cancel = CancellationToken::new();
        let last_summary = Arc::clone(&self.last_summary);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let summary = monitor.run(token).await;
            *last_summary.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
            summary
        });

        info!(%run_id, "Monitor run started");
        *active = Some(Slot::Running(ActiveRun {
            run_id,
            cancel,
            handle,
        }));
        Ok(run_id)
    }

    /// Cancel the active run and wait for it to finish.
    ///
    /// Returns `None` if nothing was running, including a run that already
    /// ended on its own or is already being stopped by another caller.
    pub async fn stop(&self) -> Option<RunSummary> {
        let (run_id, handle) = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            let run = match active.take()? {
                Slot::Running(run) if !run.handle.is_finished() => run,
                Slot::Running(_) => return None,
                stopping @ Slot::Stopping { .. } => {
                    *active = Some(stopping);
                    return None;
                }
            };
            run.cancel.cancel();
            *active = Some(Slot::Stopping {
                run_id: run.run_id,
                task: run.handle.abort_handle(),
            });
            (run.run_id, run.handle)
        };

        let result = handle.await;

        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if active.as_ref().is_some_and(|slot| slot.run_id() == run_id) {
                *active = None;
            }
        }

        match result {
            Ok(summary) => {
                info!(run_id = %summary.run_id, cycles = summary.cycles, "Monitor run stopped");
                Some(summary)
            }
            Err(e) => {
                error!(%run_id, error = %e, "Monitor task failed");
                None
            }
        }
    }

    /// Returns `true` while a run is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Slot::is_live)
    }

    /// Summary of the most recently finished run.
    #[must_use]
    pub fn last_summary(&self) -> Option<RunSummary> {
        self.last_summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::action::DryRunActionSink;
    use crate::bluetooth::mock::MockScanner;
    use crate::bluetooth::DiscoveredDevice;
    use crate::config::Config;
    use crate::observer::ChannelObserver;
    use crate::types::ExitReason;

    fn settings(grace: u64) -> MonitorSettings {
        let mut config = Config::default();
        config.device.address = "F7:F6:DB:64:91:E8".to_string();
        config.monitor.scan_interval_secs = 5;
        config.monitor.scan_timeout_secs = 5;
        config.monitor.grace_period_secs = grace;
        config.settings().unwrap()
    }

    fn supervisor_with(scanner: MockScanner) -> MonitorSupervisor {
        let (observer, _rx) = ChannelObserver::new(64);
        MonitorSupervisor::new(
            Arc::new(scanner),
            Arc::new(DryRunActionSink),
            Arc::new(observer),
        )
    }

    fn supervisor() -> MonitorSupervisor {
        supervisor_with(MockScanner::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let supervisor = supervisor();
        let run_id = supervisor.start(settings(600)).unwrap();

        assert!(supervisor.is_running());
        assert_eq!(
            supervisor.start(settings(600)),
            Err(SupervisorError::AlreadyRunning { run_id })
        );

        let summary = supervisor.stop().await.unwrap();
        assert_eq!(summary.run_id, run_id);
        assert_eq!(summary.exit, ExitReason::Cancelled);
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_a_no_op() {
        let supervisor = supervisor();
        assert!(supervisor.stop().await.is_none());
        assert!(supervisor.last_summary().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_run_is_no_longer_active() {
        let supervisor = supervisor_with(MockScanner::with_script([Ok(vec![
            DiscoveredDevice {
                address: "F7:F6:DB:64:91:E8".to_string(),
                name: None,
                rssi: Some(-50),
            },
        ])]));
        let first = supervisor.start(settings(5)).unwrap();

        // Seen once, then gone: the run ends on its own after the grace period.
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(!supervisor.is_running());
        let summary = supervisor.last_summary().unwrap();
        assert_eq!(summary.run_id, first);
        assert_eq!(summary.exit, ExitReason::Locked);

        assert!(supervisor.stop().await.is_none());
        let second = supervisor.start(settings(600)).unwrap();
        assert_ne!(first, second);
        supervisor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_rejected_while_a_run_winds_down() {
        let supervisor = supervisor();
        let run_id = supervisor.start(settings(600)).unwrap();
        tokio::task::yield_now().await;

        // The first poll cancels the run; its task has not been polled since.
        let stop = supervisor.stop();
        tokio::pin!(stop);
        assert!(futures::poll!(&mut stop).is_pending());

        assert!(supervisor.is_running());
        assert_eq!(
            supervisor.start(settings(600)),
            Err(SupervisorError::AlreadyRunning { run_id })
        );
        assert!(supervisor.stop().await.is_none());

        let summary = stop.await.unwrap();
        assert_eq!(summary.exit, ExitReason::Cancelled);
        assert!(!supervisor.is_running());
        assert!(supervisor.start(settings(600)).is_ok());
        supervisor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_stop_does_not_block_restart() {
        let supervisor = supervisor();
        supervisor.start(settings(600)).unwrap();
        tokio::task::yield_now().await;

        {
            let stop = supervisor.stop();
            tokio::pin!(stop);
            assert!(futures::poll!(&mut stop).is_pending());
        }

        // The cancelled task still finishes on its own.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!supervisor.is_running());
        assert!(supervisor.start(settings(600)).is_ok());
        supervisor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_records_last_summary() {
        let supervisor = supervisor();
        let run_id = supervisor.start(settings(600)).unwrap();
        tokio::time::sleep(Duration::from_secs(12)).await;

        supervisor.stop().await;

        let summary = supervisor.last_summary().unwrap();
        assert_eq!(summary.run_id, run_id);
        assert!(summary.cycles >= 3);
    }
}
