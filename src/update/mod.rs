//! Self-update system for the cached dm-langserver binary.
//!
//! Queries the update channel for a newer build, streams it next to the
//! active binary, and promotes staged builds with a bounded-retry rename
//! that tolerates a previous engine instance still holding the file.

pub mod applier;
pub mod channel;
pub mod state;

pub use applier::{ReplacePolicy, promote};
pub use channel::{UpdateChannelClient, UpdateOutcome};
pub use state::{AutoUpdateAnswer, AutoUpdatePreference};
