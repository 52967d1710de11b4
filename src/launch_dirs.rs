//! Centralized directory paths for the launcher.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/dm-langserver/` | `~/.config/dm-langserver/` |
//! | Cache | `~/Library/Caches/dm-langserver/` | `~/.cache/dm-langserver/` |
//!
//! # Environment Overrides
//!
//! - `DM_LAUNCH_CONFIG_DIR`: overrides [`config_dir`]
//! - `DM_LAUNCH_CACHE_DIR`: overrides [`cache_dir`]

use std::path::PathBuf;

const APP_DIR_NAME: &str = "dm-langserver";

/// Launcher config directory, home of `config.toml`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("DM_LAUNCH_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    app_dir(dirs::config_dir(), "config")
}

/// Cache directory holding auto-downloaded engine binaries.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("DM_LAUNCH_CACHE_DIR") {
        return PathBuf::from(override_dir);
    }
    app_dir(dirs::cache_dir(), "cache")
}

/// `<base>/dm-langserver`, or `<tmp>/dm-langserver/<fallback>` when the
/// platform has no such base directory.
fn app_dir(base: Option<PathBuf>, fallback: &str) -> PathBuf {
    match base {
        Some(base) => base.join(APP_DIR_NAME),
        None => std::env::temp_dir().join(APP_DIR_NAME).join(fallback),
    }
}

/// Default config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
