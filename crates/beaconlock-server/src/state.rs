//! Application state shared across handlers.

use std::path::PathBuf;
use std::sync::Arc;

use beaconlock_core::{
    ActionSink, ActionsConfig, ChannelObserver, CommandActionSink, Config, ConfigResult,
    DryRunActionSink, FanoutObserver, MonitorSupervisor, ObserverSink, ScanSource,
    TracingObserver,
};
use tokio::sync::RwLock;

use crate::feed::StatusFeed;

/// Capacity of the monitor event channel feeding the collector.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Shared, lock-protected application state.
pub type SharedState = Arc<RwLock<AppState>>;

/// Application state.
pub struct AppState {
    /// Staged configuration. Edits take effect on the next start.
    pub config: Config,

    /// Where the configuration is saved.
    pub config_path: PathBuf,

    /// Scanner shared by the monitor and one-off device scans.
    pub scanner: Arc<dyn ScanSource>,

    /// Owner of the active monitor run.
    pub supervisor: Arc<MonitorSupervisor>,

    /// Latest status and recent log lines.
    pub feed: Arc<StatusFeed>,
}

impl AppState {
    /// Build the state and spawn the event collector.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: Config, config_path: PathBuf, scanner: Arc<dyn ScanSource>) -> Self {
        let (channel, receiver) = ChannelObserver::new(EVENT_CHANNEL_CAPACITY);
        let feed = Arc::new(StatusFeed::new());
        feed.spawn_collector(receiver);

        let observer: Arc<dyn ObserverSink> = Arc::new(FanoutObserver::new(vec![
            Arc::new(channel),
            Arc::new(TracingObserver),
        ]));
        let supervisor = Arc::new(MonitorSupervisor::new(
            Arc::clone(&scanner),
            action_sink(&config.actions),
            observer,
        ));

        Self {
            config,
            config_path,
            scanner,
            supervisor,
            feed,
        }
    }

    /// Wrap the state for sharing across handlers.
    #[must_use]
    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Persist the staged configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be serialized or written.
    pub fn save_config(&self) -> ConfigResult<()> {
        self.config.save(&self.config_path)
    }

    /// Action sink for a run started from the staged configuration.
    #[must_use]
    pub fn action_sink(&self) -> Arc<dyn ActionSink> {
        action_sink(&self.config.actions)
    }
}

fn action_sink(actions: &ActionsConfig) -> Arc<dyn ActionSink> {
    if actions.dry_run {
        Arc::new(DryRunActionSink)
    } else {
        Arc::new(CommandActionSink::from_config(actions))
    }
}

/// The scanner for this build: BlueZ, or a scripted mock without hardware.
///
/// The BlueZ session is opened on first use and reopened after session
/// errors, so the server starts without an adapter and picks one up later.
#[must_use]
pub fn default_scanner() -> Arc<dyn ScanSource> {
    #[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
    {
        tracing::warn!("Using mock Bluetooth scanner; no real devices will be seen");
        Arc::new(beaconlock_core::MockScanner::new())
    }
    #[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
    {
        Arc::new(crate::scanner::ReopeningScanner::new(
            beaconlock_core::BluetoothScanner::new,
        ))
    }
}
