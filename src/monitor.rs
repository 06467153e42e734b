//! Session monitor
//!
//! Owns everything that lives for one activation: a parser per live
//! session, the session registry and the dispatcher. Hosts push output
//! chunks in with [`Monitor::feed`] and report closed sessions with
//! [`Monitor::close`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::SharedSettings;
use crate::notify::Dispatcher;
use crate::session::{SessionId, SessionRegistry};
use crate::terminal::SessionParser;

pub struct Monitor {
    settings: SharedSettings,
    registry: Arc<SessionRegistry>,
    dispatcher: Dispatcher,
    parsers: HashMap<SessionId, SessionParser>,
}

impl Monitor {
    pub fn new(
        settings: SharedSettings,
        registry: Arc<SessionRegistry>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            settings,
            registry,
            dispatcher,
            parsers: HashMap::new(),
        }
    }

    /// Feed one chunk of a session's output. Every notification the chunk
    /// completes is dispatched before this returns. Returns how many were
    /// dispatched.
    pub fn feed(&mut self, session: SessionId, chunk: &[u8]) -> usize {
        let settings = self.settings.snapshot();
        if !settings.enabled {
            return 0;
        }

        let token = self.registry.resolve_token(session);
        let parser = self.parsers.entry(session).or_insert_with(|| {
            debug!(%session, "tracking new session");
            SessionParser::new(settings.ignore_progress_style_subtype4)
        });
        parser.set_suppress_progress(settings.ignore_progress_style_subtype4);

        let notifications = parser.feed(chunk);
        for notification in &notifications {
            info!(
                %session,
                kind = ?notification.kind,
                body = %notification.body,
                "terminal notification"
            );
            let report = self.dispatcher.dispatch(notification, &token);
            debug!(%session, ?report, "dispatched");
        }
        notifications.len()
    }

    /// Forget a closed session: drop its buffer and its token mapping.
    /// Clicks on its notifications resolve to the fallback from now on.
    pub fn close(&mut self, session: SessionId) {
        if let Some(parser) = self.parsers.remove(&session) {
            debug!(%session, pending = parser.buffered(), "dropping parser");
        }
        if self.registry.remove(session).is_some() {
            debug!(%session, "session closed");
        }
    }

    /// Tear down all session state (deactivation)
    pub fn shutdown(&mut self) {
        debug!(sessions = self.registry.len(), "clearing session state");
        self.parsers.clear();
        self.registry.clear();
    }

    /// Bytes held back for a session, if it is tracked
    #[cfg(test)]
    pub fn buffered(&self, session: SessionId) -> Option<usize> {
        self.parsers.get(&session).map(SessionParser::buffered)
    }
}
