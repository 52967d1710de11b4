//! Promotion of staged engine builds.
//!
//! A downloaded build waits next to the active binary as `<primary>.update`
//! and is renamed over it at the start of the next resolution. On platforms
//! with mandatory file locking the rename fails while a previous engine
//! instance still has the binary open, so it is retried a bounded number of
//! times before giving up.

use crate::config::UpdateConfig;
use crate::error::{LauncherError, Result};
use crate::platform::is_executable;
use std::path::Path;
use std::time::Duration;

/// Retry schedule for [`promote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacePolicy {
    /// Guarded attempts before the final unguarded one.
    pub attempts: u32,
    /// Fixed delay after each failed guarded attempt.
    pub delay: Duration,
}

impl Default for ReplacePolicy {
    fn default() -> Self {
        Self {
            attempts: 8,
            delay: Duration::from_millis(250),
        }
    }
}

impl From<&UpdateConfig> for ReplacePolicy {
    fn from(config: &UpdateConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            delay: config.retry_delay(),
        }
    }
}

/// Move `staged` onto `primary` if a staged build is waiting.
///
/// Returns `Ok(false)` without touching anything when `staged` is missing or
/// not executable, and `Ok(true)` once the rename succeeds.
///
/// # Errors
///
/// Returns [`LauncherError::ReplaceFailed`] if the final attempt after
/// `policy.attempts` failures also fails.
pub async fn promote(staged: &Path, primary: &Path, policy: ReplacePolicy) -> Result<bool> {
    if !is_executable(staged) {
        return Ok(false);
    }

    for attempt in 1..=policy.attempts {
        match tokio::fs::rename(staged, primary).await {
            Ok(()) => {
                tracing::info!(
                    path = %primary.display(),
                    attempt,
                    "promoted staged engine build"
                );
                return Ok(true);
            }
            Err(e) => {
                tracing::debug!(
                    path = %primary.display(),
                    attempt,
                    error = %e,
                    "rename of staged build failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }

    tokio::fs::rename(staged, primary)
        .await
        .map_err(|source| LauncherError::ReplaceFailed {
            staged: staged.to_owned(),
            primary: primary.to_owned(),
            source,
        })?;
    tracing::info!(path = %primary.display(), "promoted staged engine build");
    Ok(true)
}
