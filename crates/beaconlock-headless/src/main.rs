//! beaconlock headless runner
//!
//! Watches the configured Bluetooth device until it has been gone for longer
//! than the grace period, then notifies and locks the session and exits.
//!
//! # Lifecycle
//!
//! 1. Resolve and load the configuration file (plus `BEACONLOCK_*` overrides)
//! 2. Snapshot it into monitor settings; refuse to start if it is incomplete
//! 3. Open the Bluetooth adapter
//! 4. Run one monitor until the device expires or SIGINT/SIGTERM arrives
//!
//! Exits 0 when the run ends (locked, lock failed, or interrupted). When it
//! could not start the exit status names the cause: 78 for configuration
//! problems, 69 when Bluetooth is unavailable, 74 when the configuration
//! path cannot be resolved, 1 otherwise.
//!
//! # Environment Variables
//!
//! - `BEACONLOCK_CONFIG`: Optional. Path of the configuration file
//! - `BEACONLOCK_LOG_LEVEL`: Optional. Log filter when `RUST_LOG` is unset (default: info)
//! - `BEACONLOCK_ACTIONS__DRY_RUN`: Optional. `true` to only log the lock

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use beaconlock_core::{
    config::default_config_path, ActionSink, BeaconLockError, BluetoothError,
    CommandActionSink, Config, ConfigError, DryRunActionSink, ExitReason, MonitorLoop,
    MonitorSettings, RunSummary, ScanSource, TracingObserver,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Environment variable names
mod env_vars {
    pub use beaconlock_core::config::CONFIG_PATH_ENV as CONFIG;
    pub const LOG_LEVEL: &str = "BEACONLOCK_LOG_LEVEL";
}

/// Default configuration values
mod defaults {
    pub const LOG_LEVEL: &str = "info";
}

/// Process exit statuses for startup failures (sysexits.h)
mod exit_codes {
    pub const FAILURE: u8 = 1;
    pub const UNAVAILABLE: u8 = 69;
    pub const IO_ERROR: u8 = 74;
    pub const CONFIG: u8 = 78;
}

/// Reasons the runner cannot start monitoring.
#[derive(Debug, thiserror::Error)]
pub enum HeadlessError {
    #[error("Cannot determine the configuration path (set {var}): {0}", var = env_vars::CONFIG)]
    NoConfigPath(#[source] ConfigError),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("Configuration is not ready for monitoring: {0}")]
    NotConfigured(#[source] ConfigError),

    #[error("Bluetooth is unavailable: {0}")]
    ScannerUnavailable(#[source] BluetoothError),
}

impl From<HeadlessError> for BeaconLockError {
    fn from(err: HeadlessError) -> Self {
        match err {
            HeadlessError::NoConfigPath(source)
            | HeadlessError::ConfigLoad { source, .. }
            | HeadlessError::NotConfigured(source) => source.into(),
            HeadlessError::ScannerUnavailable(source) => source.into(),
        }
    }
}

/// Exit status for a run that could not start.
fn exit_code(err: &BeaconLockError) -> u8 {
    if err.is_config_error() {
        exit_codes::CONFIG
    } else if err.is_bluetooth_error() {
        exit_codes::UNAVAILABLE
    } else if err.is_io_error() {
        exit_codes::IO_ERROR
    } else {
        exit_codes::FAILURE
    }
}

/// Everything a run needs, resolved before any scanning starts.
struct Prepared {
    config_path: PathBuf,
    settings: MonitorSettings,
    actions: Arc<dyn ActionSink>,
}

impl Prepared {
    /// Load the configuration at `config_path` and snapshot it for one run.
    fn load(config_path: PathBuf) -> Result<Self, HeadlessError> {
        let config = Config::load(&config_path).map_err(|source| HeadlessError::ConfigLoad {
            path: config_path.display().to_string(),
            source,
        })?;
        let settings = config.settings().map_err(HeadlessError::NotConfigured)?;

        Ok(Self {
            config_path,
            settings,
            actions: action_sink(&config),
        })
    }
}

fn action_sink(config: &Config) -> Arc<dyn ActionSink> {
    if config.actions.dry_run {
        info!("Dry run enabled: the session will not actually be locked");
        Arc::new(DryRunActionSink)
    } else {
        Arc::new(CommandActionSink::from_config(&config.actions))
    }
}

#[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
async fn open_scanner() -> Result<Arc<dyn ScanSource>, HeadlessError> {
    let scanner = beaconlock_core::BluetoothScanner::new()
        .await
        .map_err(HeadlessError::ScannerUnavailable)?;
    Ok(Arc::new(scanner))
}

#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[allow(clippy::unused_async)]
async fn open_scanner() -> Result<Arc<dyn ScanSource>, HeadlessError> {
    warn!("Built without Bluetooth support: using an empty mock scanner");
    Ok(Arc::new(beaconlock_core::MockScanner::new()))
}

/// Run one monitor to completion with log output going through `tracing`.
async fn run_monitor(
    settings: MonitorSettings,
    scanner: Arc<dyn ScanSource>,
    actions: Arc<dyn ActionSink>,
    cancel: CancellationToken,
) -> RunSummary {
    let monitor = MonitorLoop::new(
        Arc::new(settings),
        scanner,
        actions,
        Arc::new(TracingObserver),
    );
    info!(run_id = %monitor.run_id(), "Monitor run starting");
    monitor.run(cancel).await
}

/// Cancel `cancel` on the first SIGINT or SIGTERM.
fn setup_signal_handlers(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("Received SIGINT, stopping monitor..."),
            () = terminate => info!("Received SIGTERM, stopping monitor..."),
            () = cancel.cancelled() => return,
        }
        cancel.cancel();
    });
}

/// Initialize logging to stderr.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            let level = std::env::var(env_vars::LOG_LEVEL)
                .unwrap_or_else(|_| defaults::LOG_LEVEL.to_string());
            EnvFilter::try_new(level)
        })
        .unwrap_or_else(|_| EnvFilter::new(defaults::LOG_LEVEL));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting beaconlock");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            let err = BeaconLockError::from(e);
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run() -> Result<(), HeadlessError> {
    let config_path = default_config_path().map_err(HeadlessError::NoConfigPath)?;
    let prepared = Prepared::load(config_path)?;
    info!(path = %prepared.config_path.display(), "Configuration loaded");

    let scanner = open_scanner().await?;

    let cancel = CancellationToken::new();
    setup_signal_handlers(cancel.clone());

    let summary = run_monitor(prepared.settings, scanner, prepared.actions, cancel).await;

    match summary.exit {
        ExitReason::Cancelled => info!(cycles = summary.cycles, "Stopped before the device expired"),
        ExitReason::Locked => info!(cycles = summary.cycles, "Device expired, session locked"),
        ExitReason::LockFailed => {
            error!(cycles = summary.cycles, "Device expired but the session could not be locked");
        }
    }

    Ok(())
}
