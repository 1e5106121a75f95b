//! Centralized directory paths for the reminder daemon.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data (database) | `~/Library/Application Support/nudge/` | `~/.local/share/nudge/` |
//! | Config | `~/Library/Application Support/nudge/` | `~/.config/nudge/` |
//!
//! # Environment Overrides
//!
//! - `NUDGE_DATA_DIR` overrides [`data_dir`]
//! - `NUDGE_CONFIG_DIR` overrides [`config_dir`]

use std::ffi::OsString;
use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the SQLite database. Resolves to `dirs::data_dir()/nudge/` by
/// default.
#[must_use]
pub fn data_dir() -> PathBuf {
    resolve_dir(
        std::env::var_os("NUDGE_DATA_DIR"),
        dirs::data_dir(),
        "/tmp/nudge-data",
    )
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/nudge/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    resolve_dir(
        std::env::var_os("NUDGE_CONFIG_DIR"),
        dirs::config_dir(),
        "/tmp/nudge-config",
    )
}

/// Default database path (`data_dir()/nudge.db`).
#[must_use]
pub fn database_file() -> PathBuf {
    data_dir().join("nudge.db")
}

fn resolve_dir(override_dir: Option<OsString>, base: Option<PathBuf>, fallback: &str) -> PathBuf {
    if let Some(dir) = override_dir {
        return PathBuf::from(dir);
    }
    base.map(|d| d.join("nudge"))
        .unwrap_or_else(|| PathBuf::from(fallback))
}
