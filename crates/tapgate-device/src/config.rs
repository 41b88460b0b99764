//! Device configuration.
//!
//! All timing knobs ship with the defaults from
//! [`tapgate_core::constants`]; a config file only needs the fields it
//! wants to override. A missing file is normal (every default is safe
//! on real hardware), but a file that exists and does not parse is a
//! startup error — silently falling back to defaults would mask a typo
//! in exactly the deployment that tried to change something.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tapgate_core::constants::{
    DEFAULT_ANNOUNCE_RETRY_MS, DEFAULT_COALESCE_WINDOW_MS, DEFAULT_DEBOUNCE_MS,
    DEFAULT_ERROR_BACKOFF_MS, DEFAULT_HOLD_CLEAR_MS, DEFAULT_LOOP_SLEEP_MS,
    DEFAULT_POLL_TIMEOUT_MS, DEFAULT_PRESS_WINDOW_MS, PRESS_TARGET,
};
use tracing::info;

use crate::error::{DeviceError, Result};

/// Button gesture thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GestureConfig {
    /// Window within which all taps of a sequence must land.
    pub press_window_ms: u64,
    /// Tap count that triggers the provisioning mode switch.
    pub press_target: u32,
    /// Minimum spacing between accepted edges.
    pub debounce_ms: u64,
    /// Continuous hold that triggers the credential hard reset.
    pub hold_clear_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            press_window_ms: DEFAULT_PRESS_WINDOW_MS,
            press_target: PRESS_TARGET,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            hold_clear_ms: DEFAULT_HOLD_CLEAR_MS,
        }
    }
}

/// Controller configuration, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Name used in chat notifications and the online announcement.
    pub device_name: String,
    /// Response budget for one tag poll.
    pub poll_timeout_ms: u64,
    /// Sleep at the end of every tick.
    pub loop_sleep_ms: u64,
    /// Repeat reads of one tag inside this window collapse into one tap.
    pub coalesce_window_ms: u64,
    /// Backoff after a failed tick.
    pub error_backoff_ms: u64,
    /// Whether taps are pushed to the chat bot.
    pub notify_on_tap: bool,
    /// Retry spacing for the one-shot online announcement.
    pub announce_retry_ms: u64,
    /// Button gesture thresholds.
    pub gesture: GestureConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: "tapgate".to_string(),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            loop_sleep_ms: DEFAULT_LOOP_SLEEP_MS,
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW_MS,
            error_backoff_ms: DEFAULT_ERROR_BACKOFF_MS,
            notify_on_tap: true,
            announce_retry_ms: DEFAULT_ANNOUNCE_RETRY_MS,
            gesture: GestureConfig::default(),
        }
    }
}

impl DeviceConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Config`] when the file exists but cannot
    /// be read, contains invalid JSON, or names unknown fields.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(DeviceError::config(format!(
                    "cannot read {}: {error}",
                    path.display()
                )));
            }
        };

        serde_json::from_slice(&raw).map_err(|error| {
            DeviceError::config(format!("cannot parse {}: {error}", path.display()))
        })
    }
}
