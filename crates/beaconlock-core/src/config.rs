//! Application configuration management.
//!
//! Handles loading, saving, and validating beaconlock configuration:
//! - The Bluetooth device whose presence keeps the session unlocked
//! - Scan cadence, grace period, and the informational RSSI floor
//! - Lock and notification commands
//! - The bind address of the interactive HTTP surface
//!
//! Sources are layered with the `config` crate: the TOML file (optional),
//! then `BEACONLOCK_<SECTION>__<KEY>` environment variables. A loaded
//! [`Config`] is an editable document; [`Config::settings`] turns it into
//! the validated, immutable [`MonitorSettings`] a monitor run consumes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder address written by default; means "no device configured".
pub const UNCONFIGURED_ADDRESS: &str = "00:00:00:00:00:00";

/// Environment variable that overrides the configuration file path.
pub const CONFIG_PATH_ENV: &str = "BEACONLOCK_CONFIG";

const ENV_PREFIX: &str = "BEACONLOCK";

/// Valid RSSI range in dBm accepted for `min_rssi`.
pub const RSSI_RANGE: std::ops::RangeInclusive<i16> = -127..=20;

static MAC_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("MAC address regex is valid")
});

/// Returns `true` if `address` looks like `XX:XX:XX:XX:XX:XX` (hex, any case).
#[must_use]
pub fn is_valid_mac_address(address: &str) -> bool {
    MAC_ADDRESS_RE.is_match(address)
}

/// Errors raised while loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform configuration directory could be determined.
    #[error("Cannot determine configuration directory; set {CONFIG_PATH_ENV}")]
    NoConfigDir,

    /// The configuration file could not be written.
    #[error("Failed to write {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The layered sources could not be merged or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted field path, e.g. `monitor.grace_period_secs`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration problems: {}", .0.len(), join_errors(.0))]
    MultipleValidationErrors(Vec<ConfigError>),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Returns `true` for validation failures (as opposed to I/O or parse errors).
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError { .. } | Self::MultipleValidationErrors(_)
        )
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The device to watch.
    pub device: DeviceConfig,

    /// Scan cadence and grace policy.
    pub monitor: MonitorConfig,

    /// Lock and notification commands.
    pub actions: ActionsConfig,

    /// Interactive HTTP surface.
    pub server: ServerConfig,
}

/// The paired device whose presence keeps the session unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Display label only; never used for matching.
    pub name: String,

    /// Bluetooth address used as the (case-insensitive) match key.
    pub address: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "My Device".to_string(),
            address: UNCONFIGURED_ADDRESS.to_string(),
        }
    }
}

/// Timing and signal settings for the monitor loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds to wait after one cycle finishes before the next scan.
    pub scan_interval_secs: u64,

    /// Seconds of continuous absence tolerated before locking.
    pub grace_period_secs: u64,

    /// Seconds a single scan may listen; at most `scan_interval_secs`.
    pub scan_timeout_secs: u64,

    /// Signal floor in dBm. Weaker sightings are logged, never acted on.
    pub min_rssi: i16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 5,
            grace_period_secs: 15,
            scan_timeout_secs: 5,
            min_rssi: -70,
        }
    }
}

/// Commands run when the grace period expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Lock command as an argv list. Platform default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_command: Option<Vec<String>>,

    /// Whether to show a desktop notification before locking.
    pub notify: bool,

    /// Notification argv template with `{title}` and `{body}` placeholders.
    /// Platform default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_command: Option<Vec<String>>,

    /// Upper bound in seconds for each lock or notification command.
    pub action_timeout_secs: u64,

    /// Log the lock instead of executing it.
    pub dry_run: bool,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            lock_command: None,
            notify: true,
            notify_command: None,
            action_timeout_secs: 5,
            dry_run: false,
        }
    }
}

impl ActionsConfig {
    /// Per-command timeout as a [`Duration`].
    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the interactive surface listens on.
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (optional) layered with environment
    /// variables.
    ///
    /// A missing file yields the defaults plus any environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] if a source is malformed.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let layered = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(layered.try_deserialize()?)
    }

    /// Load configuration from [`default_config_path`].
    ///
    /// # Errors
    ///
    /// Returns an error if no path can be determined or a source is malformed.
    pub fn load_default() -> ConfigResult<Self> {
        Self::load(&default_config_path()?)
    }

    /// Save configuration to `path` as pretty TOML, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Returns `true` when a real device address has been entered.
    #[must_use]
    pub fn is_device_configured(&self) -> bool {
        !self.device.address.trim().is_empty()
            && !self
                .device
                .address
                .trim()
                .eq_ignore_ascii_case(UNCONFIGURED_ADDRESS)
    }

    /// Every problem with this configuration, in field order.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let address = self.device.address.trim();
        if address.is_empty() {
            errors.push(ConfigError::invalid("device.address", "must not be empty"));
        } else if !is_valid_mac_address(address) {
            errors.push(ConfigError::invalid(
                "device.address",
                format!("'{address}' is not in format XX:XX:XX:XX:XX:XX"),
            ));
        } else if !self.is_device_configured() {
            errors.push(ConfigError::invalid(
                "device.address",
                "no device configured; set the address of the device to watch",
            ));
        }

        let monitor = &self.monitor;
        if monitor.scan_interval_secs == 0 {
            errors.push(ConfigError::invalid(
                "monitor.scan_interval_secs",
                "must be greater than zero",
            ));
        }
        if monitor.grace_period_secs == 0 {
            errors.push(ConfigError::invalid(
                "monitor.grace_period_secs",
                "must be greater than zero",
            ));
        }
        if monitor.scan_timeout_secs == 0 {
            errors.push(ConfigError::invalid(
                "monitor.scan_timeout_secs",
                "must be greater than zero",
            ));
        } else if monitor.scan_interval_secs > 0
            && monitor.scan_timeout_secs > monitor.scan_interval_secs
        {
            errors.push(ConfigError::invalid(
                "monitor.scan_timeout_secs",
                format!(
                    "must not exceed scan_interval_secs ({})",
                    monitor.scan_interval_secs
                ),
            ));
        }
        if !RSSI_RANGE.contains(&monitor.min_rssi) {
            errors.push(ConfigError::invalid(
                "monitor.min_rssi",
                format!(
                    "must be between {} and {} dBm",
                    RSSI_RANGE.start(),
                    RSSI_RANGE.end()
                ),
            ));
        }

        let actions = &self.actions;
        if actions.action_timeout_secs == 0 {
            errors.push(ConfigError::invalid(
                "actions.action_timeout_secs",
                "must be greater than zero",
            ));
        }
        if actions.lock_command.as_ref().is_some_and(Vec::is_empty) {
            errors.push(ConfigError::invalid(
                "actions.lock_command",
                "must name a program when set",
            ));
        }
        if actions.notify_command.as_ref().is_some_and(Vec::is_empty) {
            errors.push(ConfigError::invalid(
                "actions.notify_command",
                "must name a program when set",
            ));
        }

        errors
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem or
    /// [`ConfigError::MultipleValidationErrors`] listing all of them.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = self.validation_errors();
        if errors.len() > 1 {
            return Err(ConfigError::MultipleValidationErrors(errors));
        }
        errors.pop().map_or(Ok(()), Err)
    }

    /// Snapshot this configuration into the immutable settings of one run.
    ///
    /// # Errors
    ///
    /// Returns the validation errors if the configuration cannot start a monitor.
    pub fn settings(&self) -> ConfigResult<MonitorSettings> {
        self.validate()?;
        Ok(MonitorSettings {
            target_name: self.device.name.trim().to_string(),
            target_address: self.device.address.trim().to_ascii_uppercase(),
            scan_interval: Duration::from_secs(self.monitor.scan_interval_secs),
            grace_period: Duration::from_secs(self.monitor.grace_period_secs),
            scan_timeout: Duration::from_secs(self.monitor.scan_timeout_secs),
            min_rssi: self.monitor.min_rssi,
        })
    }
}

/// Validated settings for one monitor run. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    target_name: String,
    target_address: String,
    scan_interval: Duration,
    grace_period: Duration,
    scan_timeout: Duration,
    min_rssi: i16,
}

impl MonitorSettings {
    /// Display label of the watched device.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Upper-cased address of the watched device.
    #[must_use]
    pub fn target_address(&self) -> &str {
        &self.target_address
    }

    /// Pause between the end of one cycle and the next scan.
    #[must_use]
    pub const fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    /// Tolerated continuous absence. Always non-zero.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// How long each scan listens. Never longer than the scan interval.
    #[must_use]
    pub const fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }

    /// Informational signal floor in dBm.
    #[must_use]
    pub const fn min_rssi(&self) -> i16 {
        self.min_rssi
    }
}

/// Resolve the configuration file path.
///
/// Uses `BEACONLOCK_CONFIG` when set, otherwise `config.toml` in the
/// platform configuration directory (`~/.config/beaconlock/` on Linux).
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] if no home directory is known.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let dirs =
        directories::ProjectDirs::from("", "", "beaconlock").ok_or(ConfigError::NoConfigDir)?;
    Ok(dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        let mut config = Config::default();
        config.device.name = "ColorFit Cadet".to_string();
        config.device.address = "f7:f6:db:64:91:e8".to_string();
        config
    }

    #[test]
    fn test_mac_address_validation() {
        assert!(is_valid_mac_address("F7:F6:DB:64:91:E8"));
        assert!(is_valid_mac_address("f7:f6:db:64:91:e8"));
        assert!(!is_valid_mac_address("F7:F6:DB:64:91"));
        assert!(!is_valid_mac_address("F7-F6-DB-64-91-E8"));
        assert!(!is_valid_mac_address("G7:F6:DB:64:91:E8"));
        assert!(!is_valid_mac_address(""));
    }

    #[test]
    fn test_default_config_is_not_startable() {
        let config = Config::default();
        assert!(!config.is_device_configured());

        let err = config.validate().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("device.address"));
    }

    #[test]
    fn test_configured_defaults_validate() {
        let config = configured();
        assert!(config.validate().is_ok());
        assert!(config.validation_errors().is_empty());
    }

    #[test]
    fn test_all_problems_are_collected() {
        let mut config = configured();
        config.device.address = "not-an-address".to_string();
        config.monitor.scan_interval_secs = 0;
        config.monitor.grace_period_secs = 0;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => {
                assert_eq!(errors.len(), 3);
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_timeout_must_fit_in_interval() {
        let mut config = configured();
        config.monitor.scan_interval_secs = 3;
        config.monitor.scan_timeout_secs = 5;

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError { ref field, .. } if field == "monitor.scan_timeout_secs"
        ));
    }

    #[test]
    fn test_empty_lock_command_rejected() {
        let mut config = configured();
        config.actions.lock_command = Some(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_rssi_range() {
        let mut config = configured();
        config.monitor.min_rssi = -200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings_snapshot() {
        let settings = configured().settings().unwrap();
        assert_eq!(settings.target_address(), "F7:F6:DB:64:91:E8");
        assert_eq!(settings.target_name(), "ColorFit Cadet");
        assert_eq!(settings.scan_interval(), Duration::from_secs(5));
        assert_eq!(settings.grace_period(), Duration::from_secs(15));
        assert_eq!(settings.scan_timeout(), Duration::from_secs(5));
        assert_eq!(settings.min_rssi(), -70);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.monitor, MonitorConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[device]
name = "ColorFit Cadet"
address = "F7:F6:DB:64:91:E8"

[monitor]
grace_period_secs = 30
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.device.address, "F7:F6:DB:64:91:E8");
        assert_eq!(config.monitor.grace_period_secs, 30);
        assert_eq!(config.monitor.scan_interval_secs, 5);
        assert!(config.actions.notify);
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[monitor\ngrace = ").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = configured();
        config.actions.lock_command = Some(vec!["loginctl".into(), "lock-session".into()]);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.device, config.device);
        assert_eq!(loaded.actions.lock_command, config.actions.lock_command);
    }
}
