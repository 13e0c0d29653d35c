//! Centralized application directory paths for Laila.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/laila/` | `~/.local/share/laila/` |
//! | Config | `~/Library/Application Support/laila/` | `~/.config/laila/` |
//!
//! # Environment Overrides
//!
//! - `LAILA_DATA_DIR` overrides [`data_dir`]
//! - `LAILA_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root: persisted state and chat sessions.
///
/// Resolves to `dirs::data_dir()/laila/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LAILA_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("laila"))
        .unwrap_or_else(|| PathBuf::from("/tmp/laila-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/laila/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("LAILA_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("laila"))
        .unwrap_or_else(|| PathBuf::from("/tmp/laila-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
