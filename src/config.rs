//! Configuration types for the reminder engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{NudgeError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    /// Reminder planning, dispatch and polling settings.
    pub reminders: ReminderConfig,
    /// Database location.
    pub storage: StorageConfig,
    /// Outbound delivery settings.
    pub delivery: DeliveryConfig,
}

/// Reminder subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Master switch for planning, dispatch and the scheduler loop.
    pub enabled: bool,
    /// Polling interval in hours. Fractional values are allowed
    /// (`0.1` is six minutes). Non-positive values are repaired at start.
    pub check_interval_hours: f64,
    /// Reminder offsets in whole days before the deadline.
    ///
    /// Only 1, 3 and 7 map to a reminder kind; anything else is ignored.
    pub default_reminders: Vec<i64>,
    /// Delay applied when a reminder instant has already passed but the
    /// deadline has not.
    pub grace_delay_secs: u64,
    /// Give up on a notification after this many failed sends. `0` retries forever.
    pub max_send_attempts: u32,
    /// Base delay before retrying a failed send. Doubles per attempt.
    /// `0` leaves a failed row due for the next tick.
    pub retry_backoff_secs: u64,
    /// Upper bound on the retry delay.
    pub retry_backoff_max_secs: u64,
    /// How long a dispatch claim keeps other dispatchers away from a row.
    pub claim_ttl_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_hours: 6.0,
            default_reminders: vec![1, 3, 7],
            grace_delay_secs: 60,
            max_send_attempts: 0,
            retry_backoff_secs: 0,
            retry_backoff_max_secs: 6 * 3600,
            claim_ttl_secs: 300,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file (None = `nudge_dirs::database_file()`).
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Database path to open, falling back to the platform data directory.
    #[must_use]
    pub fn effective_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(crate::nudge_dirs::database_file)
    }
}

/// Outbound delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Webhook that receives `{"address": …, "text": …}` payloads.
    /// When unset, reminders are only written to the log.
    pub webhook_url: Option<String>,
    /// HTTP timeout for a single delivery.
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

impl NudgeConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| NudgeError::Config(e.to_string()))
    }

    /// Load from `path` when it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| NudgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `nudge_dirs::config_dir()/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::nudge_dirs::config_dir().join("config.toml")
    }
}
