//! Error types for the dm-langserver launcher.

use std::path::PathBuf;

/// Top-level error type for command resolution and self-update.
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    /// Configuration could not be read, parsed, or written.
    #[error("config error: {0}")]
    Config(String),

    /// A staged binary could not be promoted after exhausting retries.
    #[error("cannot replace {} with {}: {source}", .primary.display(), .staged.display())]
    ReplaceFailed {
        /// The staged `.update` file.
        staged: PathBuf,
        /// The active binary path.
        primary: PathBuf,
        /// Error from the final rename attempt.
        #[source]
        source: std::io::Error,
    },

    /// Interactive prompt failed (not the same as the user cancelling).
    #[error("prompt error: {0}")]
    Prompt(String),

    /// The engine process could not be spawned.
    #[error("launch error: {0}")]
    Launch(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, LauncherError>;
