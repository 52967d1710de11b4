//! Configuration types and the persistent settings store.
//!
//! The editor-facing settings (override path, auto-update preference) are
//! read and written through [`SettingsStore`] so the resolver never touches
//! the config file directly.

use crate::error::{LauncherError, Result};
use crate::update::AutoUpdatePreference;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default update channel endpoint.
pub const DEFAULT_UPDATE_URL: &str = "https://wombat.platymuus.com/ss13/dm-langserver/update.php";

/// Top-level launcher configuration, persisted as `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Engine executable selection.
    pub langserver: LangserverConfig,
    /// Update channel settings.
    pub update: UpdateConfig,
}

/// User-facing engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LangserverConfig {
    /// Explicit executable override. When set, auto-update is never used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Auto-update preference. Absent means the user has not been asked yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_update: Option<bool>,
}

/// Update channel endpoint and timing knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Update endpoint URL.
    pub url: String,
    /// Guarded rename attempts before the final unguarded one.
    pub retry_attempts: u32,
    /// Delay between rename attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Delay after a foreground download before launching, in milliseconds.
    pub settle_delay_ms: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPDATE_URL.to_owned(),
            retry_attempts: 8,
            retry_delay_ms: 250,
            settle_delay_ms: 500,
        }
    }
}

impl UpdateConfig {
    /// Delay between rename attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Settle delay after a foreground download.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl LauncherConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| LauncherError::Config(e.to_string()))
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
            toml::to_string_pretty(self).map_err(|e| LauncherError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// External key/value store for the settings the resolver reads and writes.
pub trait SettingsStore: Send + Sync {
    /// Configured override executable, if any.
    fn override_path(&self) -> Option<PathBuf>;

    /// Persist a new override executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set_override_path(&self, path: &Path) -> Result<()>;

    /// Stored auto-update preference.
    fn auto_update(&self) -> AutoUpdatePreference;

    /// Persist the auto-update preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set_auto_update(&self, enabled: bool) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`SettingsStore`] backed by a `config.toml` file. Every write goes
/// straight to disk.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Mutex<LauncherConfig>,
}

impl ConfigStore {
    /// Open the store at `path`. A missing file yields the default config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = if path.is_file() {
            LauncherConfig::from_file(&path)?
        } else {
            LauncherConfig::default()
        };
        Ok(Self {
            path,
            config: Mutex::new(config),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> LauncherConfig {
        lock(&self.config).clone()
    }

    fn update(&self, apply: impl FnOnce(&mut LangserverConfig)) -> Result<()> {
        let mut config = lock(&self.config);
        apply(&mut config.langserver);
        config.save_to_file(&self.path)
    }
}

impl SettingsStore for ConfigStore {
    fn override_path(&self) -> Option<PathBuf> {
        lock(&self.config).langserver.path.clone()
    }

    fn set_override_path(&self, path: &Path) -> Result<()> {
        self.update(|ls| ls.path = Some(path.to_owned()))
    }

    fn auto_update(&self) -> AutoUpdatePreference {
        AutoUpdatePreference::from(lock(&self.config).langserver.auto_update)
    }

    fn set_auto_update(&self, enabled: bool) -> Result<()> {
        self.update(|ls| ls.auto_update = Some(enabled))
    }
}

/// In-memory [`SettingsStore`] for embedders that persist settings elsewhere.
#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: Mutex<LangserverConfig>,
}

impl MemorySettings {
    /// Create a store seeded with the given settings.
    pub fn new(settings: LangserverConfig) -> Self {
        Self {
            inner: Mutex::new(settings),
        }
    }

    /// Snapshot of the current settings.
    pub fn snapshot(&self) -> LangserverConfig {
        lock(&self.inner).clone()
    }
}

impl SettingsStore for MemorySettings {
    fn override_path(&self) -> Option<PathBuf> {
        lock(&self.inner).path.clone()
    }

    fn set_override_path(&self, path: &Path) -> Result<()> {
        lock(&self.inner).path = Some(path.to_owned());
        Ok(())
    }

    fn auto_update(&self) -> AutoUpdatePreference {
        AutoUpdatePreference::from(lock(&self.inner).auto_update)
    }

    fn set_auto_update(&self, enabled: bool) -> Result<()> {
        lock(&self.inner).auto_update = Some(enabled);
        Ok(())
    }
}
