//! Bluetooth Low Energy scanning.
//!
//! This module provides:
//! - The [`ScanSource`] seam the monitor loop scans through
//! - [`BluetoothScanner`], a BlueZ-backed scanner (feature `bluetooth`)
//! - [`MockScanner`], a scripted scanner for development without hardware
//!   (feature `mock-bluetooth`, or whenever `bluetooth` is off)
//!
//! A scan only reports what it heard; deciding whether the watched device is
//! present is the job of [`crate::presence`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors raised by a scan. All of them are transient from the monitor's
/// point of view: a failed scan counts as "not seen this cycle".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BluetoothError {
    /// No Bluetooth adapter is present.
    #[error("No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded.")]
    AdapterNotFound,

    /// The adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    AdapterPoweredOff,

    /// The scan did not finish within its time budget.
    #[error("Bluetooth scan timed out after {duration_secs} seconds")]
    ScanTimeout {
        /// The budget that was exceeded.
        duration_secs: u64,
    },

    /// A connection to the Bluetooth daemon could not be established.
    #[error("Failed to open Bluetooth session: {message}")]
    SessionInitFailed {
        /// Daemon error text.
        message: String,
    },

    /// Discovery started but failed.
    #[error("Bluetooth discovery failed: {message}")]
    DiscoveryFailed {
        /// Daemon error text.
        message: String,
    },

    /// The scanner itself misbehaved (e.g. panicked).
    #[error("Bluetooth scanner error: {message}")]
    Internal {
        /// Description of the fault.
        message: String,
    },
}

impl BluetoothError {
    /// Returns `true` if the adapter session is likely stale and should be
    /// reopened before the next scan, e.g. after bluetoothd restarted.
    #[must_use]
    pub const fn needs_reopen(&self) -> bool {
        matches!(
            self,
            Self::AdapterNotFound
                | Self::AdapterPoweredOff
                | Self::SessionInitFailed { .. }
                | Self::DiscoveryFailed { .. }
        )
    }
}

/// Result alias for scan operations.
pub type BluetoothResult<T> = std::result::Result<T, BluetoothError>;

/// A device heard during one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "F7:F6:DB:64:91:E8",
    "name": "ColorFit Cadet",
    "rssi": -58
}))]
pub struct DiscoveredDevice {
    /// Bluetooth address as reported by the adapter.
    #[schema(example = "F7:F6:DB:64:91:E8")]
    pub address: String,

    /// Advertised name, if any.
    #[schema(example = "ColorFit Cadet")]
    pub name: Option<String>,

    /// Signal strength in dBm, if reported.
    #[schema(example = -58)]
    pub rssi: Option<i16>,
}

impl DiscoveredDevice {
    /// Advertised name or `"Unknown"`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Case-insensitive comparison of two Bluetooth addresses.
#[must_use]
pub fn addresses_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Something that can listen for nearby devices.
///
/// Implementations should return within roughly `timeout`; the monitor loop
/// cuts off scans that overrun and counts them as failed.
#[async_trait]
pub trait ScanSource: Send + Sync {
    /// Listen for `timeout` and report every device heard, in the order they
    /// were first heard.
    async fn discover(&self, timeout: Duration) -> BluetoothResult<Vec<DiscoveredDevice>>;
}

/// Devices heard during one scan window, in the order first heard.
///
/// BlueZ replays every cached device when discovery starts, so an address
/// alone proves nothing. A device counts as heard only with an RSSI sampled
/// while discovery was still running.
#[cfg(any(test, feature = "bluetooth"))]
#[derive(Debug, Default)]
pub(crate) struct ScanWindow {
    devices: Vec<DiscoveredDevice>,
}

#[cfg(any(test, feature = "bluetooth"))]
impl ScanWindow {
    /// Record a sample taken during discovery. Returns `false` if it was
    /// dropped for lacking a live RSSI.
    pub(crate) fn record(&mut self, address: &str, name: Option<String>, rssi: Option<i16>) -> bool {
        let Some(rssi) = rssi else {
            return false;
        };
        match self
            .devices
            .iter_mut()
            .find(|device| addresses_match(&device.address, address))
        {
            Some(device) => {
                device.rssi = Some(rssi);
                if name.is_some() {
                    device.name = name;
                }
            }
            None => self.devices.push(DiscoveredDevice {
                address: address.to_string(),
                name,
                rssi: Some(rssi),
            }),
        }
        true
    }

    pub(crate) fn into_devices(self) -> Vec<DiscoveredDevice> {
        self.devices
    }
}

#[cfg(feature = "bluetooth")]
pub use self::bluez::BluetoothScanner;

#[cfg(feature = "bluetooth")]
mod bluez {
    use std::collections::HashSet;
    use std::time::Duration;

    use async_trait::async_trait;
    use bluer::{AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport};
    use futures::StreamExt;
    use tracing::{debug, instrument, warn};

    use super::{BluetoothError, BluetoothResult, DiscoveredDevice, ScanSource, ScanWindow};

    /// BlueZ-backed LE scanner on the default adapter.
    pub struct BluetoothScanner {
        // Keeps the D-Bus connection alive for `adapter`.
        _session: bluer::Session,
        adapter: bluer::Adapter,
    }

    impl BluetoothScanner {
        /// Open a BlueZ session on the default adapter.
        ///
        /// # Errors
        ///
        /// Returns an error if the daemon is unreachable, no adapter exists,
        /// or the adapter is powered off.
        pub async fn new() -> BluetoothResult<Self> {
            let session = bluer::Session::new()
                .await
                .map_err(|e| BluetoothError::SessionInitFailed {
                    message: e.to_string(),
                })?;
            let adapter = session
                .default_adapter()
                .await
                .map_err(|_| BluetoothError::AdapterNotFound)?;

            let powered = adapter
                .is_powered()
                .await
                .map_err(|e| BluetoothError::SessionInitFailed {
                    message: e.to_string(),
                })?;
            if !powered {
                return Err(BluetoothError::AdapterPoweredOff);
            }

            debug!(adapter = %adapter.name(), "Bluetooth adapter ready");

            Ok(Self {
                _session: session,
                adapter,
            })
        }

        /// Name and RSSI of `address`. Only meaningful while discovery is
        /// running: BlueZ clears RSSI once it stops.
        async fn sample(&self, address: Address) -> (Option<String>, Option<i16>) {
            let device = match self.adapter.device(address) {
                Ok(device) => device,
                Err(e) => {
                    warn!(%address, error = %e, "Discovered device vanished");
                    return (None, None);
                }
            };
            let rssi = device.rssi().await.ok().flatten();
            let name = device.name().await.ok().flatten();
            (name, rssi)
        }
    }

    #[async_trait]
    impl ScanSource for BluetoothScanner {
        #[instrument(skip(self), fields(timeout_secs = timeout.as_secs()))]
        async fn discover(&self, timeout: Duration) -> BluetoothResult<Vec<DiscoveredDevice>> {
            let mut filter = DiscoveryFilter::default();
            filter.transport = DiscoveryTransport::Le;
            filter.duplicate_data = true;
            if let Err(e) = self.adapter.set_discovery_filter(filter).await {
                warn!(error = %e, "Could not restrict discovery to LE, scanning all transports");
            }

            // Discovery runs for as long as `events` is alive.
            let mut events = Box::pin(self.adapter.discover_devices().await.map_err(|e| {
                BluetoothError::DiscoveryFailed {
                    message: e.to_string(),
                }
            })?);

            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            let mut seen = HashSet::new();
            let mut order = Vec::new();
            loop {
                tokio::select! {
                    () = &mut deadline => break,
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            if seen.insert(address) {
                                order.push(address);
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }

            let mut window = ScanWindow::default();
            for address in order {
                let (name, rssi) = self.sample(address).await;
                if !window.record(&address.to_string(), name, rssi) {
                    debug!(%address, "Cached device not heard in this window");
                }
            }
            drop(events);

            let devices = window.into_devices();
            debug!(count = devices.len(), "Scan window closed");
            Ok(devices)
        }
    }
}

#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use self::mock::MockScanner;

#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{BluetoothResult, DiscoveredDevice, ScanSource};

    /// Scanner that replays scripted results, one per call.
    ///
    /// Once the script runs out every scan reports no devices.
    #[derive(Debug, Default)]
    pub struct MockScanner {
        script: Mutex<VecDeque<BluetoothResult<Vec<DiscoveredDevice>>>>,
    }

    impl MockScanner {
        /// Create a scanner with an empty script.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a scanner that replays `script` in order.
        #[must_use]
        pub fn with_script(
            script: impl IntoIterator<Item = BluetoothResult<Vec<DiscoveredDevice>>>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
            }
        }

        /// Append one scripted scan result.
        pub fn push(&self, result: BluetoothResult<Vec<DiscoveredDevice>>) {
            self.script
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push_back(result);
        }
    }

    #[async_trait]
    impl ScanSource for MockScanner {
        async fn discover(&self, _timeout: Duration) -> BluetoothResult<Vec<DiscoveredDevice>> {
            self.script
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}
