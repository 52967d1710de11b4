//! Engine command resolution.
//!
//! `CommandResolver` decides which `dm-langserver` executable to launch:
//! 1. **Override**: a configured path is used verbatim, never auto-updated
//! 2. **Warm cache**: the cached per-platform build launches immediately
//!    while the update channel is checked in the background
//! 3. **Cold cache**: the build is downloaded in the foreground first
//! 4. **Fallback**: any failure asks the user to browse for an executable
//!
//! Every path ends in either a command or an explicit reason why there is
//! none; errors never escape [`CommandResolver::resolve`].

use crate::config::{SettingsStore, UpdateConfig};
use crate::integrity::{FileDigest, digest_file_async};
use crate::launch_dirs;
use crate::platform::{ENGINE_NAME, PlatformKey, is_executable, staged_path_for};
use crate::prompt::Prompter;
use crate::update::{
    AutoUpdateAnswer, AutoUpdatePreference, ReplacePolicy, UpdateChannelClient, UpdateOutcome,
    promote,
};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const ENABLE_UPDATES_QUESTION: &str =
    "Auto-updates are available for dm-langserver. Would you like to enable them?";
const BROWSE: &str = "Browse";
const CANCEL: &str = "Cancel";
const INVALID_OVERRIDE: &str = "Configured executable is missing or invalid.";
const UPDATES_DISABLED: &str = "No cached executable and auto-update disabled.";
const UPDATES_NOT_ENABLED: &str = "No cached executable and auto-update not enabled (prompt dismissed). \
     Set `auto_update = true` under `[langserver]` to allow downloads.";

/// How to start the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerCommand {
    /// Executable path.
    pub path: PathBuf,
    /// Arguments (currently always empty).
    pub args: Vec<String>,
}

impl ServerCommand {
    /// A command running `path` with no arguments.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }
}

impl fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A cached engine build as currently found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBinary {
    /// The file that is executed.
    pub primary_path: PathBuf,
    /// Downloaded replacement awaiting promotion.
    pub staged_path: PathBuf,
    /// Digest of `primary_path`, once computed.
    pub content_hash: Option<FileDigest>,
}

impl CachedBinary {
    /// Describe the cache slot at `primary` without reading it.
    pub fn at(primary: impl Into<PathBuf>) -> Self {
        let primary_path = primary.into();
        Self {
            staged_path: staged_path_for(&primary_path),
            primary_path,
            content_hash: None,
        }
    }

    /// Fill in `content_hash`. An unreadable file leaves it `None`.
    pub async fn hashed(mut self) -> Self {
        match digest_file_async(self.primary_path.clone()).await {
            Ok(digest) => self.content_hash = Some(digest),
            Err(e) => tracing::warn!(
                path = %self.primary_path.display(),
                error = %e,
                "cannot hash cached engine build"
            ),
        }
        self
    }

    /// Whether the primary file can be launched.
    pub fn is_ready(&self) -> bool {
        is_executable(&self.primary_path)
    }
}

/// Which branch produced (or failed to produce) a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// An explicit override path from the configuration.
    ConfiguredOverride,
    /// No usable cached build; downloaded in the foreground.
    AutoDetectCold,
    /// A cached build launched immediately; update checked in the background.
    AutoDetectWarm,
    /// No command for this attempt.
    Failed,
}

/// Outcome of [`CommandResolver::resolve`].
#[derive(Debug)]
pub enum Resolution {
    /// Start the engine with `command`.
    Launch {
        /// The command to run.
        command: ServerCommand,
        /// The branch that produced it.
        state: ResolutionState,
        /// Background update check, if one was started. Yields `None` when
        /// the check was skipped.
        background_update: Option<JoinHandle<Option<UpdateOutcome>>>,
    },
    /// The engine should not be started.
    NoCommand {
        /// Human-readable explanation.
        reason: String,
    },
}

impl Resolution {
    /// The command, if there is one.
    pub fn command(&self) -> Option<&ServerCommand> {
        match self {
            Self::Launch { command, .. } => Some(command),
            Self::NoCommand { .. } => None,
        }
    }

    /// The resolution state.
    pub fn state(&self) -> ResolutionState {
        match self {
            Self::Launch { state, .. } => *state,
            Self::NoCommand { .. } => ResolutionState::Failed,
        }
    }

    /// The failure reason, if there is no command.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Launch { .. } => None,
            Self::NoCommand { reason } => Some(reason),
        }
    }

    /// Wait for the background update check, if any, and return its outcome.
    pub async fn background_outcome(&mut self) -> Option<UpdateOutcome> {
        let Self::Launch {
            background_update, ..
        } = self
        else {
            return None;
        };
        let handle = background_update.take()?;
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "background update task failed");
                None
            }
        }
    }
}

/// State shared between a resolver and the status reporter for one editor
/// session.
#[derive(Debug, Clone, Default)]
pub struct LaunchSession {
    update_available: Arc<AtomicBool>,
    auto_update_answer: Arc<Mutex<Option<bool>>>,
}

impl LaunchSession {
    /// Create a fresh session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a newer build has been staged and will be used after restart.
    pub fn update_available(&self) -> bool {
        self.update_available.load(Ordering::Acquire)
    }

    /// Record that a newer build has been staged. Sticky for the session.
    pub fn mark_update_available(&self) {
        self.update_available.store(true, Ordering::Release);
    }

    fn auto_update_answer(&self) -> Option<bool> {
        self.auto_update_answer.lock().ok().and_then(|a| *a)
    }

    fn remember_auto_update(&self, enabled: bool) {
        if let Ok(mut answer) = self.auto_update_answer.lock() {
            *answer = Some(enabled);
        }
    }
}

/// Tunables for a [`CommandResolver`].
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Directory holding the per-platform cached build.
    pub cache_dir: PathBuf,
    /// Update channel endpoint.
    pub update_url: String,
    /// Version reported to the channel.
    pub client_version: String,
    /// Platform whose build is cached and requested.
    pub platform: PlatformKey,
    /// Rename retry schedule for staged builds.
    pub replace_policy: ReplacePolicy,
    /// Pause after a foreground download before launching.
    pub settle_delay: Duration,
}

impl ResolverOptions {
    /// Options for `cache_dir` using the endpoint and timings in `update`.
    pub fn from_config(update: &UpdateConfig, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            update_url: update.url.clone(),
            client_version: env!("CARGO_PKG_VERSION").to_owned(),
            platform: PlatformKey::current().clone(),
            replace_policy: ReplacePolicy::from(update),
            settle_delay: update.settle_delay(),
        }
    }

    /// Path of the cached build: `<cache_dir>/dm-langserver-<arch>-<os>[.exe]`.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(self.platform.binary_file_name())
    }
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from_config(&UpdateConfig::default(), launch_dirs::cache_dir())
    }
}

/// Everything the update path needs, cloneable into the background task.
#[derive(Clone)]
struct UpdateContext {
    settings: Arc<dyn SettingsStore>,
    prompter: Arc<dyn Prompter>,
    channel: UpdateChannelClient,
    platform: PlatformKey,
    version: String,
    session: LaunchSession,
}

impl UpdateContext {
    /// Stored preference, asking the user once per session when unset.
    async fn auto_update_enabled(&self) -> bool {
        match self.settings.auto_update() {
            AutoUpdatePreference::Enabled => return true,
            AutoUpdatePreference::Disabled => return false,
            AutoUpdatePreference::Unset => {}
        }
        if let Some(enabled) = self.session.auto_update_answer() {
            return enabled;
        }

        let answer = self
            .prompter
            .ask(ENABLE_UPDATES_QUESTION, &AutoUpdateAnswer::OPTIONS)
            .await
            .and_then(|choice| AutoUpdateAnswer::from_choice(&choice));
        let Some(answer) = answer else {
            tracing::info!("auto-update prompt dismissed, skipping updates this session");
            self.session.remember_auto_update(false);
            return false;
        };

        if let Some(persist) = answer.persisted()
            && let Err(e) = self.settings.set_auto_update(persist)
        {
            tracing::warn!(error = %e, "cannot persist auto-update preference");
        }
        self.session.remember_auto_update(answer.enables());
        answer.enables()
    }

    async fn check(&self, current_hash: Option<&FileDigest>, dest: &Path) -> UpdateOutcome {
        let outcome = self
            .channel
            .check_and_fetch(&self.platform, &self.version, current_hash, dest)
            .await;

        match &outcome {
            UpdateOutcome::Updated | UpdateOutcome::Unmodified => {
                tracing::info!(%outcome, "update check finished");
            }
            UpdateOutcome::ChannelRemoved { .. } => {
                tracing::warn!(%outcome, "disabling auto-update");
                if let Err(e) = self.settings.set_auto_update(false) {
                    tracing::warn!(error = %e, "cannot persist auto-update preference");
                }
                self.session.remember_auto_update(false);
            }
            UpdateOutcome::Unavailable { .. } | UpdateOutcome::NetworkError { .. } => {
                tracing::warn!(%outcome, "update check failed");
            }
        }
        outcome
    }

    async fn background_update(self, primary: PathBuf) -> Option<UpdateOutcome> {
        if !self.auto_update_enabled().await {
            tracing::debug!("auto-update disabled, skipping background check");
            return None;
        }
        let cached = CachedBinary::at(primary).hashed().await;
        let hash = cached.content_hash.as_ref()?;

        let outcome = self.check(Some(hash), &cached.staged_path).await;
        if outcome.is_updated() {
            tracing::info!(
                path = %cached.staged_path.display(),
                "engine update staged, restart to apply"
            );
            self.session.mark_update_available();
        }
        Some(outcome)
    }
}

enum Candidate {
    Override(PathBuf),
    AutoDetect,
}

/// Decides which engine executable to launch. See the module docs.
///
/// One resolution should run at a time; callers that can trigger restarts
/// concurrently must serialize calls to [`CommandResolver::resolve`].
pub struct CommandResolver {
    ctx: UpdateContext,
    options: ResolverOptions,
    background_prompter: Option<Arc<dyn Prompter>>,
}

impl CommandResolver {
    /// Create a resolver with a fresh [`LaunchSession`].
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        prompter: Arc<dyn Prompter>,
        options: ResolverOptions,
    ) -> Self {
        Self::with_session(settings, prompter, options, LaunchSession::new())
    }

    /// Create a resolver sharing an existing session.
    pub fn with_session(
        settings: Arc<dyn SettingsStore>,
        prompter: Arc<dyn Prompter>,
        options: ResolverOptions,
        session: LaunchSession,
    ) -> Self {
        let ctx = UpdateContext {
            settings,
            prompter,
            channel: UpdateChannelClient::new(options.update_url.clone()),
            platform: options.platform.clone(),
            version: options.client_version.clone(),
            session,
        };
        Self {
            ctx,
            options,
            background_prompter: None,
        }
    }

    /// Use `prompter` for questions raised by the background update check
    /// instead of the main prompter, e.g. once the engine owns the terminal.
    #[must_use]
    pub fn with_background_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.background_prompter = Some(prompter);
        self
    }

    /// The session shared with status observers.
    pub fn session(&self) -> &LaunchSession {
        &self.ctx.session
    }

    /// Resolver options.
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Determine the command to launch.
    pub async fn resolve(&self) -> Resolution {
        let mut candidate = match self.ctx.settings.override_path() {
            Some(path) => Candidate::Override(path),
            None => Candidate::AutoDetect,
        };

        loop {
            let failure = match candidate {
                Candidate::Override(path) => match self.use_override(&path).await {
                    Ok(command) => {
                        tracing::info!(
                            state = ?ResolutionState::ConfiguredOverride,
                            %command,
                            "engine command resolved"
                        );
                        return Resolution::Launch {
                            command,
                            state: ResolutionState::ConfiguredOverride,
                            background_update: None,
                        };
                    }
                    Err(reason) => reason,
                },
                Candidate::AutoDetect => match self.auto_detect().await {
                    Ok(resolution) => return resolution,
                    Err(reason) => reason,
                },
            };

            match self.browse(&failure).await {
                Some(path) => candidate = Candidate::Override(path),
                None => {
                    tracing::warn!(state = ?ResolutionState::Failed, reason = %failure, "no engine command");
                    return Resolution::NoCommand { reason: failure };
                }
            }
        }
    }

    async fn use_override(&self, path: &Path) -> Result<ServerCommand, String> {
        promote(&staged_path_for(path), path, self.options.replace_policy)
            .await
            .map_err(|e| format!("Could not apply the pending update: {e}."))?;
        if is_executable(path) {
            Ok(ServerCommand::new(path))
        } else {
            tracing::warn!(path = %path.display(), "configured engine is not executable");
            Err(INVALID_OVERRIDE.to_owned())
        }
    }

    async fn auto_detect(&self) -> Result<Resolution, String> {
        let cached = CachedBinary::at(self.options.cache_path());
        promote(&cached.staged_path, &cached.primary_path, self.options.replace_policy)
            .await
            .map_err(|e| format!("Could not apply the downloaded update: {e}."))?;

        if cached.is_ready() {
            Ok(self.launch_warm(cached.primary_path))
        } else {
            self.launch_cold(cached.primary_path).await
        }
    }

    fn launch_warm(&self, primary: PathBuf) -> Resolution {
        let command = ServerCommand::new(&primary);
        tracing::info!(
            state = ?ResolutionState::AutoDetectWarm,
            %command,
            "engine command resolved, checking for updates in the background"
        );
        let mut ctx = self.ctx.clone();
        if let Some(prompter) = &self.background_prompter {
            ctx.prompter = Arc::clone(prompter);
        }
        let background = tokio::spawn(ctx.background_update(primary));
        Resolution::Launch {
            command,
            state: ResolutionState::AutoDetectWarm,
            background_update: Some(background),
        }
    }

    async fn launch_cold(&self, primary: PathBuf) -> Result<Resolution, String> {
        if !self.ctx.auto_update_enabled().await {
            return Err(match self.ctx.settings.auto_update() {
                AutoUpdatePreference::Unset => UPDATES_NOT_ENABLED.to_owned(),
                _ => UPDATES_DISABLED.to_owned(),
            });
        }

        tracing::info!(path = %primary.display(), "no cached engine build, downloading");
        match self.ctx.check(None, &primary).await {
            UpdateOutcome::Updated => {}
            other => return Err(format!("Auto-update failed: {other}.")),
        }

        // Some platforms briefly report a just-closed file as busy.
        tokio::time::sleep(self.options.settle_delay).await;
        if !is_executable(&primary) {
            return Err(format!(
                "Downloaded {ENGINE_NAME} at {} is not executable.",
                primary.display()
            ));
        }

        let command = ServerCommand::new(primary);
        tracing::info!(
            state = ?ResolutionState::AutoDetectCold,
            %command,
            "engine command resolved"
        );
        Ok(Resolution::Launch {
            command,
            state: ResolutionState::AutoDetectCold,
            background_update: None,
        })
    }

    /// Ask the user to pick an executable. A picked path is persisted as the
    /// new override.
    async fn browse(&self, reason: &str) -> Option<PathBuf> {
        let question = format!("The {ENGINE_NAME} executable must be selected. {reason}");
        let choice = self.ctx.prompter.ask(&question, &[BROWSE, CANCEL]).await;
        if choice.as_deref() != Some(BROWSE) {
            return None;
        }

        let path = self
            .ctx
            .prompter
            .pick_file(&format!("Select the {ENGINE_NAME} executable"))
            .await?;
        if let Err(e) = self.ctx.settings.set_override_path(&path) {
            tracing::warn!(error = %e, "cannot persist engine path");
        }
        Some(path)
    }
}
