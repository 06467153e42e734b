//! Focus routing for notification clicks
//!
//! A click (desktop notifier, banner action, deep link) only carries a
//! session token. The router turns it back into a session and asks the
//! host to bring it forward, degrading to showing the terminal at all when
//! the session is gone.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::session::{SessionId, SessionRegistry, SessionToken};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("session {0} is no longer open")]
    SessionClosed(SessionId),

    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),

    #[error("host command failed: {0}")]
    Command(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Actions the embedding terminal host can perform
pub trait TerminalHost: Send + Sync {
    /// Bring one specific session to the foreground
    fn focus_session(&self, session: SessionId) -> Result<(), HostError>;

    /// Show the terminal area without targeting a session
    fn reveal_panel(&self) -> Result<(), HostError>;

    /// Last resort when revealing is unavailable
    fn toggle_panel(&self) -> Result<(), HostError>;
}

/// What a focus request ended up doing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusOutcome {
    Focused(SessionId),
    /// The session resolved but the host refused; the error was swallowed
    FocusFailed(SessionId),
    RevealedPanel,
    ToggledPanel,
    /// Token missed and neither fallback worked
    Unavailable,
}

#[derive(Clone)]
pub struct FocusRouter {
    registry: Arc<SessionRegistry>,
    host: Arc<dyn TerminalHost>,
}

impl FocusRouter {
    pub fn new(registry: Arc<SessionRegistry>, host: Arc<dyn TerminalHost>) -> Self {
        Self { registry, host }
    }

    /// Focus the session behind `token`. Never fails; safe to call at any
    /// time, including after the session has closed.
    pub fn focus(&self, token: &SessionToken) -> FocusOutcome {
        let Some(session) = self.registry.resolve_session(token) else {
            debug!(%token, "stale session token, showing terminal instead");
            return self.fallback();
        };

        match self.host.focus_session(session) {
            Ok(()) => {
                debug!(%session, "focused session");
                FocusOutcome::Focused(session)
            }
            Err(e) => {
                debug!(%session, error = %e, "focus request failed");
                FocusOutcome::FocusFailed(session)
            }
        }
    }

    fn fallback(&self) -> FocusOutcome {
        match self.host.reveal_panel() {
            Ok(()) => FocusOutcome::RevealedPanel,
            Err(e) => {
                debug!(error = %e, "reveal failed, toggling");
                match self.host.toggle_panel() {
                    Ok(()) => FocusOutcome::ToggledPanel,
                    Err(e) => {
                        warn!(error = %e, "no way to show the terminal");
                        FocusOutcome::Unavailable
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Host that records every call and fails where told to
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub calls: Mutex<Vec<String>>,
        pub closed: Mutex<Vec<SessionId>>,
        pub reveal_unsupported: bool,
        pub toggle_unsupported: bool,
    }

    impl RecordingHost {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TerminalHost for RecordingHost {
        fn focus_session(&self, session: SessionId) -> Result<(), HostError> {
            self.calls.lock().unwrap().push(format!("focus {}", session));
            if self.closed.lock().unwrap().contains(&session) {
                return Err(HostError::SessionClosed(session));
            }
            Ok(())
        }

        fn reveal_panel(&self) -> Result<(), HostError> {
            self.calls.lock().unwrap().push("reveal".to_string());
            if self.reveal_unsupported {
                return Err(HostError::Unsupported("reveal"));
            }
            Ok(())
        }

        fn toggle_panel(&self) -> Result<(), HostError> {
            self.calls.lock().unwrap().push("toggle".to_string());
            if self.toggle_unsupported {
                return Err(HostError::Unsupported("toggle"));
            }
            Ok(())
        }
    }

    fn router_with(host: RecordingHost) -> (FocusRouter, Arc<SessionRegistry>, Arc<RecordingHost>) {
        let registry = Arc::new(SessionRegistry::new());
        let host = Arc::new(host);
        let router = FocusRouter::new(Arc::clone(&registry), host.clone());
        (router, registry, host)
    }

    #[test]
    fn test_focuses_live_session() {
        let (router, registry, host) = router_with(RecordingHost::default());
        let session = SessionId::next();
        let token = registry.resolve_token(session);
        assert_eq!(router.focus(&token), FocusOutcome::Focused(session));
        assert_eq!(host.calls(), vec![format!("focus {}", session)]);
    }

    #[test]
    fn test_destroyed_session_falls_back_once() {
        let (router, registry, host) = router_with(RecordingHost::default());
        let session = SessionId::next();
        let token = registry.resolve_token(session);
        registry.remove(session);
        assert_eq!(registry.resolve_session(&token), None);
        assert_eq!(router.focus(&token), FocusOutcome::RevealedPanel);
        assert_eq!(host.calls(), vec!["reveal".to_string()]);
    }

    #[test]
    fn test_unsupported_reveal_toggles() {
        let (router, _, host) = router_with(RecordingHost {
            reveal_unsupported: true,
            ..Default::default()
        });
        let token = SessionToken::mint();
        assert_eq!(router.focus(&token), FocusOutcome::ToggledPanel);
        assert_eq!(host.calls(), vec!["reveal".to_string(), "toggle".to_string()]);
    }

    #[test]
    fn test_everything_unsupported_still_returns() {
        let (router, _, _) = router_with(RecordingHost {
            reveal_unsupported: true,
            toggle_unsupported: true,
            ..Default::default()
        });
        assert_eq!(router.focus(&SessionToken::mint()), FocusOutcome::Unavailable);
    }

    #[test]
    fn test_host_focus_error_is_swallowed() {
        let (router, registry, host) = router_with(RecordingHost::default());
        let session = SessionId::next();
        let token = registry.resolve_token(session);
        host.closed.lock().unwrap().push(session);
        assert_eq!(router.focus(&token), FocusOutcome::FocusFailed(session));
        assert_eq!(host.calls().len(), 1);
    }
}
