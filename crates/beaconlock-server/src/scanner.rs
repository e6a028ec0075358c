//! Scanner that survives the Bluetooth stack going away.
//!
//! The server runs for a long time. bluetoothd may restart or the adapter
//! may be unplugged underneath it, leaving a session that fails every scan.
//! [`ReopeningScanner`] opens its inner scanner on first use, drops it when a
//! scan reports a session-level error, and opens a fresh one next time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beaconlock_core::{BluetoothResult, DiscoveredDevice, ScanSource};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Lazily opened scanner, reopened after session errors.
pub struct ReopeningScanner<S, F> {
    open: F,
    inner: Mutex<Option<Arc<S>>>,
}

impl<S, F, Fut> ReopeningScanner<S, F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = BluetoothResult<S>>,
{
    /// Wrap `open`, which is called whenever no usable scanner is cached.
    #[must_use]
    pub fn new(open: F) -> Self {
        Self {
            open,
            inner: Mutex::new(None),
        }
    }

    async fn scanner(&self) -> BluetoothResult<Arc<S>> {
        let mut inner = self.inner.lock().await;
        if let Some(scanner) = inner.as_ref() {
            return Ok(Arc::clone(scanner));
        }
        let scanner = Arc::new((self.open)().await?);
        info!("Bluetooth scanner opened");
        *inner = Some(Arc::clone(&scanner));
        Ok(scanner)
    }

    async fn forget(&self, stale: &Arc<S>) {
        let mut inner = self.inner.lock().await;
        if inner.as_ref().is_some_and(|cached| Arc::ptr_eq(cached, stale)) {
            *inner = None;
        }
    }
}

#[async_trait]
impl<S, F, Fut> ScanSource for ReopeningScanner<S, F>
where
    S: ScanSource + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BluetoothResult<S>> + Send + 'static,
{
    async fn discover(&self, timeout: Duration) -> BluetoothResult<Vec<DiscoveredDevice>> {
        let scanner = self.scanner().await?;
        let result = scanner.discover(timeout).await;
        if let Err(e) = &result {
            if e.needs_reopen() {
                warn!(error = %e, "Bluetooth session looks stale, reopening on next scan");
                self.forget(&scanner).await;
            }
        }
        result
    }
}
