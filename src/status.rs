//! Engine status projection.
//!
//! The engine reports what it is doing through `$window/status`
//! notifications and pushes its object tree through
//! `experimental/dreammaker/objectTree`. [`LifecycleReporter`] turns the
//! former into a [`StatusView`] for status bars and keeps the latest tree
//! for tree views. Each status event replaces the previous one entirely.

use crate::resolver::LaunchSession;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// JSON-RPC method of the status notification.
pub const WINDOW_STATUS_METHOD: &str = "$window/status";

/// JSON-RPC method of the object tree notification.
pub const OBJECT_TREE_METHOD: &str = "experimental/dreammaker/objectTree";

/// Task name the engine reports when the workspace has no `.dme` project.
pub const NO_PROJECT_FILE_TASK: &str = "no .dme file";

/// Label used when the engine has not reported an environment.
pub const DEFAULT_LABEL: &str = "dm-langserver";

/// Suffix appended to the status text once an update has been staged.
pub const UPDATE_READY_SUFFIX: &str = " - update ready, restart to apply";

/// Parameters of a `$window/status` notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStatus {
    /// Name of the loaded environment (`.dme`), if any.
    #[serde(default)]
    pub environment: Option<String>,
    /// Tasks in progress.
    #[serde(default)]
    pub tasks: Option<Vec<String>>,
}

/// Position in a document (zero-based).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPosition {
    /// Line number.
    pub line: u32,
    /// Character offset in the line.
    #[serde(default)]
    pub character: u32,
}

/// Range in a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    /// Inclusive start.
    pub start: TextPosition,
    /// Exclusive end.
    pub end: TextPosition,
}

/// Source location of an object tree entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeLocation {
    /// Document URI.
    pub uri: String,
    /// Span of the definition.
    pub range: TextRange,
}

/// One node of the engine's object tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTreeEntry {
    /// Display name.
    pub name: String,
    /// Symbol kind as an LSP `SymbolKind` number.
    #[serde(default)]
    pub kind: u32,
    /// Definition site, if known.
    #[serde(default)]
    pub location: Option<TreeLocation>,
    /// Child entries.
    #[serde(default)]
    pub children: Vec<ObjectTreeEntry>,
}

/// Parameters of an object tree notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTree {
    /// Top-level entries.
    #[serde(default)]
    pub roots: Vec<ObjectTreeEntry>,
}

impl ObjectTree {
    /// Total number of entries in the tree.
    pub fn len(&self) -> usize {
        fn count(entries: &[ObjectTreeEntry]) -> usize {
            entries.iter().map(|e| 1 + count(&e.children)).sum()
        }
        count(&self.roots)
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Notifications from the engine that the reporter understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotification {
    /// `$window/status`.
    Status(WindowStatus),
    /// `experimental/dreammaker/objectTree`.
    ObjectTree(ObjectTree),
}

impl EngineNotification {
    /// Decode a JSON-RPC notification. Unknown methods and malformed params
    /// yield `None`.
    pub fn parse(method: &str, params: serde_json::Value) -> Option<Self> {
        let decoded = match method {
            WINDOW_STATUS_METHOD => serde_json::from_value(params).map(Self::Status),
            OBJECT_TREE_METHOD => serde_json::from_value(params).map(Self::ObjectTree),
            _ => return None,
        };
        match decoded {
            Ok(notification) => Some(notification),
            Err(e) => {
                tracing::warn!(method, error = %e, "malformed engine notification");
                None
            }
        }
    }
}

/// Last status snapshot reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    /// Environment label, if reported.
    pub environment_label: Option<String>,
    /// Tasks in progress, in reported order.
    pub active_tasks: Vec<String>,
}

impl From<WindowStatus> for EngineStatus {
    fn from(status: WindowStatus) -> Self {
        Self {
            environment_label: status.environment,
            active_tasks: status.tasks.unwrap_or_default(),
        }
    }
}

/// Coarse engine state derived from the latest status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineState {
    /// No tasks in progress.
    #[default]
    Idle,
    /// At least one task in progress.
    Busy,
    /// No project file was found, or the engine has exited.
    Degraded,
}

/// What a status bar should show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusView {
    /// Status text.
    pub text: String,
    /// Full task list, one per line, when there is more than one task.
    pub detail: Option<String>,
    /// Derived engine state.
    pub state: EngineState,
    /// The engine reported the "no project file" sentinel task.
    pub missing_project_file: bool,
}

impl StatusView {
    /// Project a status snapshot. `update_ready` appends the restart hint.
    pub fn project(status: &EngineStatus, update_ready: bool) -> Self {
        let label = status.environment_label.as_deref().unwrap_or(DEFAULT_LABEL);
        let tasks = &status.active_tasks;

        let (mut text, detail) = match tasks.as_slice() {
            [] => (label.to_owned(), None),
            [task] => (format!("{label}: {task}"), None),
            many => (
                format!("{label}: {} tasks...", many.len()),
                Some(many.join("\n")),
            ),
        };
        if update_ready {
            text.push_str(UPDATE_READY_SUFFIX);
        }

        let missing_project_file = tasks.iter().any(|t| t == NO_PROJECT_FILE_TASK);
        let state = if missing_project_file {
            EngineState::Degraded
        } else if tasks.is_empty() {
            EngineState::Idle
        } else {
            EngineState::Busy
        };

        Self {
            text,
            detail,
            state,
            missing_project_file,
        }
    }
}

/// Consumes engine notifications and publishes derived state to observers.
pub struct LifecycleReporter {
    session: LaunchSession,
    status: EngineStatus,
    view_tx: watch::Sender<StatusView>,
    tree_tx: watch::Sender<Option<Arc<ObjectTree>>>,
}

impl LifecycleReporter {
    /// Create a reporter for `session`. The initial view is the idle label.
    pub fn new(session: LaunchSession) -> Self {
        let status = EngineStatus::default();
        let (view_tx, _) = watch::channel(StatusView::project(&status, session.update_available()));
        let (tree_tx, _) = watch::channel(None);
        Self {
            session,
            status,
            view_tx,
            tree_tx,
        }
    }

    /// Subscribe to status view changes.
    pub fn subscribe(&self) -> watch::Receiver<StatusView> {
        self.view_tx.subscribe()
    }

    /// Subscribe to object tree replacements.
    pub fn subscribe_tree(&self) -> watch::Receiver<Option<Arc<ObjectTree>>> {
        self.tree_tx.subscribe()
    }

    /// Last status reported by the engine.
    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    /// Current view.
    pub fn view(&self) -> StatusView {
        self.view_tx.borrow().clone()
    }

    /// Apply one notification and return the resulting view.
    pub fn handle(&mut self, notification: EngineNotification) -> StatusView {
        match notification {
            EngineNotification::Status(status) => {
                self.status = EngineStatus::from(status);
                let view = StatusView::project(&self.status, self.session.update_available());
                if view.missing_project_file {
                    tracing::warn!("engine found no project file");
                }
                self.view_tx.send_replace(view.clone());
                view
            }
            EngineNotification::ObjectTree(tree) => {
                tracing::debug!(entries = tree.len(), "object tree updated");
                self.tree_tx.send_replace(Some(Arc::new(tree)));
                self.view()
            }
        }
    }

    /// Refresh the view without a new event, e.g. after the update flag was
    /// set by a background check.
    pub fn refresh(&mut self) -> StatusView {
        let view = StatusView::project(&self.status, self.session.update_available());
        self.view_tx.send_replace(view.clone());
        view
    }

    /// Mark the engine as gone.
    pub fn engine_exited(&mut self) -> StatusView {
        let mut view = StatusView::project(&self.status, self.session.update_available());
        view.state = EngineState::Degraded;
        self.view_tx.send_replace(view.clone());
        view
    }

    /// Drain `events` until the engine side closes it, then mark the engine
    /// as exited. Returns the final view.
    pub async fn run(mut self, mut events: mpsc::Receiver<EngineNotification>) -> StatusView {
        while let Some(notification) = events.recv().await {
            self.handle(notification);
        }
        tracing::info!("engine notification stream closed");
        self.engine_exited()
    }
}
