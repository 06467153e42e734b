//! Notification sink interfaces
//!
//! The dispatcher talks to two collaborators: an external (desktop)
//! notifier and an in-app notifier. Both are traits so hosts and tests can
//! supply their own.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::session::SessionToken;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to launch {helper}: {source}")]
    Spawn {
        helper: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{helper} exited with status {code:?}")]
    Failed {
        helper: &'static str,
        code: Option<i32>,
    },

    #[error("desktop notification failed: {0}")]
    Desktop(String),

    #[error("desktop notifications are not supported on {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Optional per-platform fields; each adapter uses the ones it understands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlatformHints {
    pub icon: Option<PathBuf>,
    /// macOS sender bundle id (controls the header icon)
    pub sender: Option<String>,
    /// macOS bundle id activated on click
    pub activate_id: Option<String>,
    /// Token echoed back through the click handler
    pub click_token: Option<SessionToken>,
    /// Deep link to activate on click when click events are unavailable
    pub open_uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayRequest {
    pub title: String,
    pub body: String,
    pub token: SessionToken,
    pub hints: PlatformHints,
}

/// Process-lifetime callback fired with the token of a clicked notification
pub type ClickHandler = Arc<dyn Fn(SessionToken) + Send + Sync>;

/// Desktop notification backend
pub trait ExternalNotifier: Send + Sync {
    /// Show a notification. Must not wait for the user.
    fn display(&self, request: DisplayRequest) -> Result<(), NotifyError>;

    /// Whether clicks come back through the click handler
    fn supports_click(&self) -> bool;

    /// Install the click handler. Only the first installation takes
    /// effect; later calls return `false`.
    fn install_click_handler(&self, handler: ClickHandler) -> bool;
}

/// Called at most once if the user picks the notification's action
pub type SelectionCallback = Box<dyn FnOnce() + Send>;

/// In-application notification surface
pub trait InAppNotifier: Send + Sync {
    fn show_message(
        &self,
        text: &str,
        action_label: &str,
        on_select: SelectionCallback,
    ) -> Result<(), NotifyError>;
}

/// Install-once holder for a [`ClickHandler`]
#[derive(Default)]
pub struct ClickSlot {
    handler: OnceLock<ClickHandler>,
}

impl ClickSlot {
    pub fn install(&self, handler: ClickHandler) -> bool {
        self.handler.set(handler).is_ok()
    }

    /// Fire the handler if one is installed
    pub fn fire(&self, token: SessionToken) -> bool {
        match self.handler.get() {
            Some(handler) => {
                handler(token);
                true
            }
            None => false,
        }
    }
}
