//! dm-launch: resolution and self-update of the dm-langserver engine.
//!
//! An editor integration asks this crate which executable to start, and
//! feeds the engine's status notifications back for display.
//!
//! # Architecture
//!
//! - **Integrity**: MD5 digests of cached builds (`integrity`)
//! - **Promotion**: bounded-retry rename of staged builds (`update::applier`)
//! - **Update channel**: HTTP check-and-download (`update::channel`)
//! - **Resolution**: override / warm cache / cold cache / browse (`resolver`)
//! - **Status**: engine notification projection (`status`)

pub mod config;
pub mod error;
pub mod integrity;
pub mod launch_dirs;
pub mod platform;
pub mod prompt;
pub mod resolver;
pub mod status;
pub mod update;

pub use config::{LauncherConfig, SettingsStore};
pub use error::{LauncherError, Result};
pub use platform::PlatformKey;
pub use resolver::{CommandResolver, LaunchSession, Resolution, ServerCommand};
pub use status::{LifecycleReporter, StatusView};
pub use update::{UpdateChannelClient, UpdateOutcome};
