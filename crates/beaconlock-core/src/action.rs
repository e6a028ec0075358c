//! Lock and notification actions.
//!
//! The monitor calls an [`ActionSink`] exactly once per run, when the grace
//! period runs out: first `notify`, then `lock`. Both are best-effort. A
//! failed notification does not stop the lock, and a failed lock is logged,
//! never retried.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ActionsConfig;

/// Title of the notification shown before locking.
pub const NOTIFICATION_TITLE: &str = "Bluetooth Lock";

/// Body of the notification shown before locking.
#[must_use]
pub fn lock_notification_body(device_name: &str) -> String {
    format!("{device_name} not found. Locking screen...")
}

/// Errors raised while running a lock or notification command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The configured argv list is empty.
    #[error("No command configured")]
    EmptyCommand,

    /// The program could not be started.
    #[error("Failed to start '{program}': {message}")]
    SpawnFailed {
        /// Program name.
        program: String,
        /// OS error text.
        message: String,
    },

    /// The program ran but exited unsuccessfully.
    #[error("'{program}' exited with {status}: {stderr}")]
    CommandFailed {
        /// Program name.
        program: String,
        /// Exit status description.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The program did not finish in time and was killed.
    #[error("'{program}' did not finish within {timeout_secs} seconds")]
    Timeout {
        /// Program name.
        program: String,
        /// The limit that was exceeded.
        timeout_secs: u64,
    },
}

/// Host actions taken when the device has been gone too long.
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Show a user notification. Best-effort.
    async fn notify(&self, title: &str, body: &str) -> Result<(), ActionError>;

    /// Lock the current session.
    async fn lock(&self) -> Result<(), ActionError>;
}

/// Runs external commands for the lock and the notification.
#[derive(Debug, Clone)]
pub struct CommandActionSink {
    lock_command: Vec<String>,
    notify_command: Option<Vec<String>>,
    timeout: Duration,
}

impl CommandActionSink {
    /// Create a sink with explicit commands.
    #[must_use]
    pub const fn new(
        lock_command: Vec<String>,
        notify_command: Option<Vec<String>>,
        timeout: Duration,
    ) -> Self {
        Self {
            lock_command,
            notify_command,
            timeout,
        }
    }

    /// Build a sink from configuration, filling in platform defaults.
    #[must_use]
    pub fn from_config(actions: &ActionsConfig) -> Self {
        let lock_command = actions
            .lock_command
            .clone()
            .unwrap_or_else(default_lock_command);
        let notify_command = if actions.notify {
            actions.notify_command.clone().or_else(default_notify_command)
        } else {
            None
        };
        Self::new(lock_command, notify_command, actions.action_timeout())
    }

    /// The lock argv this sink runs.
    #[must_use]
    pub fn lock_command(&self) -> &[String] {
        &self.lock_command
    }
}

#[async_trait]
impl ActionSink for CommandActionSink {
    async fn notify(&self, title: &str, body: &str) -> Result<(), ActionError> {
        let Some(template) = &self.notify_command else {
            debug!("Notifications disabled or unsupported on this platform");
            return Ok(());
        };
        let argv = render_template(template, title, body);
        run_command(&argv, self.timeout).await
    }

    async fn lock(&self) -> Result<(), ActionError> {
        info!(command = ?self.lock_command, "Locking session");
        run_command(&self.lock_command, self.timeout).await
    }
}

/// Logs what would happen instead of doing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunActionSink;

#[async_trait]
impl ActionSink for DryRunActionSink {
    async fn notify(&self, title: &str, body: &str) -> Result<(), ActionError> {
        info!(%title, %body, "Dry run: would show notification");
        Ok(())
    }

    async fn lock(&self) -> Result<(), ActionError> {
        warn!("Dry run: would lock the session now");
        Ok(())
    }
}

/// Platform lock command.
#[must_use]
pub fn default_lock_command() -> Vec<String> {
    let argv: &[&str] = if cfg!(target_os = "windows") {
        &["rundll32.exe", "user32.dll,LockWorkStation"]
    } else if cfg!(target_os = "macos") {
        &["pmset", "displaysleepnow"]
    } else {
        &["loginctl", "lock-session"]
    };
    argv.iter().map(ToString::to_string).collect()
}

/// Platform notification command template, if the platform has one.
#[must_use]
pub fn default_notify_command() -> Option<Vec<String>> {
    if cfg!(target_os = "windows") {
        return None;
    }
    let argv: &[&str] = if cfg!(target_os = "macos") {
        &[
            "osascript",
            "-e",
            "display notification \"{body}\" with title \"{title}\"",
        ]
    } else {
        &["notify-send", "--app-name=beaconlock", "{title}", "{body}"]
    };
    Some(argv.iter().map(ToString::to_string).collect())
}

fn render_template(template: &[String], title: &str, body: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace("{title}", title).replace("{body}", body))
        .collect()
}

async fn run_command(argv: &[String], timeout: Duration) -> Result<(), ActionError> {
    let (program, args) = argv.split_first().ok_or(ActionError::EmptyCommand)?;

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ActionError::SpawnFailed {
            program: program.clone(),
            message: e.to_string(),
        })?;

    // On timeout the child is dropped, which kills it.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ActionError::Timeout {
            program: program.clone(),
            timeout_secs: timeout.as_secs(),
        })?
        .map_err(|e| ActionError::SpawnFailed {
            program: program.clone(),
            message: e.to_string(),
        })?;

    if output.status.success() {
        debug!(%program, "Command finished");
        Ok(())
    } else {
        Err(ActionError::CommandFailed {
            program: program.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_render_template_substitutes_placeholders() {
        let rendered = render_template(
            &argv(&["notify-send", "{title}", "{body}", "--urgency=critical"]),
            NOTIFICATION_TITLE,
            &lock_notification_body("ColorFit Cadet"),
        );
        assert_eq!(
            rendered,
            argv(&[
                "notify-send",
                "Bluetooth Lock",
                "ColorFit Cadet not found. Locking screen...",
                "--urgency=critical",
            ])
        );
    }

    #[test]
    fn test_from_config_respects_notify_flag() {
        let actions = ActionsConfig {
            notify: false,
            notify_command: Some(argv(&["notify-send", "{title}"])),
            ..ActionsConfig::default()
        };
        let sink = CommandActionSink::from_config(&actions);
        assert!(sink.notify_command.is_none());
        assert_eq!(sink.lock_command(), default_lock_command().as_slice());
    }

    #[test]
    fn test_from_config_prefers_configured_lock_command() {
        let actions = ActionsConfig {
            lock_command: Some(argv(&["xdg-screensaver", "lock"])),
            ..ActionsConfig::default()
        };
        let sink = CommandActionSink::from_config(&actions);
        assert_eq!(sink.lock_command(), argv(&["xdg-screensaver", "lock"]).as_slice());
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let result = run_command(&[], Duration::from_secs(1)).await;
        assert_eq!(result, Err(ActionError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let sink = CommandActionSink::new(
            argv(&["beaconlock-definitely-not-a-program"]),
            None,
            Duration::from_secs(1),
        );
        assert!(matches!(
            sink.lock().await,
            Err(ActionError::SpawnFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_notify_without_command_is_a_no_op() {
        let sink = CommandActionSink::new(argv(&["true"]), None, Duration::from_secs(1));
        tokio_test::assert_ok!(sink.notify(NOTIFICATION_TITLE, "body").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_and_failing_lock_commands() {
        let ok = CommandActionSink::new(argv(&["true"]), None, Duration::from_secs(5));
        tokio_test::assert_ok!(ok.lock().await);

        let failing = CommandActionSink::new(argv(&["false"]), None, Duration::from_secs(5));
        assert!(matches!(
            failing.lock().await,
            Err(ActionError::CommandFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hanging_command_is_killed_after_timeout() {
        let sink = CommandActionSink::new(
            argv(&["sleep", "30"]),
            None,
            Duration::from_millis(200),
        );
        assert!(matches!(
            sink.lock().await,
            Err(ActionError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_dry_run_always_succeeds() {
        tokio_test::assert_ok!(DryRunActionSink.notify("t", "b").await);
        tokio_test::assert_ok!(DryRunActionSink.lock().await);
    }
}
