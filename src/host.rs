//! Desktop terminal host
//!
//! Focus requests end up here. A wrapped PTY session lives in the outer
//! terminal window, so focusing it means asking that window to raise
//! itself (XTWINOPS). A watched tmux pane is selected through tmux.
//!
//! Window operations share the outer terminal with the wrapped program, so
//! they are written through a screen overlay rather than a second handle.

use std::collections::HashMap;
use std::io::Write;
use std::process::Command;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::focus::{HostError, TerminalHost};
use crate::session::SessionId;
use crate::terminal::escape;

/// Where a session's output is coming from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionTarget {
    /// Child process running in our own PTY
    Pty,
    /// tmux pane fed to us through `pipe-pane`
    TmuxPane(String),
    /// Output from a pipe with no window to raise
    Detached,
}

pub struct DesktopHost {
    sessions: Mutex<HashMap<SessionId, SessionTarget>>,
    /// Receives window operations; `None` when there is no terminal
    window: Option<Mutex<Box<dyn Write + Send>>>,
}

impl DesktopHost {
    pub fn new(window: Option<Box<dyn Write + Send>>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            window: window.map(Mutex::new),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionTarget>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register a new live session
    pub fn open(&self, target: SessionTarget) -> SessionId {
        let id = SessionId::next();
        debug!(session = %id, ?target, "session opened");
        self.sessions().insert(id, target);
        id
    }

    pub fn close(&self, session: SessionId) {
        self.sessions().remove(&session);
    }

    fn write_window(&self, action: &'static str, sequence: &str) -> Result<(), HostError> {
        let Some(window) = &self.window else {
            return Err(HostError::Unsupported(action));
        };
        let mut out = window.lock().unwrap_or_else(|p| p.into_inner());
        out.write_all(sequence.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn raise_window(&self) -> Result<(), HostError> {
        let sequence = format!("{}{}", escape::WINDOW_DEICONIFY, escape::WINDOW_RAISE);
        self.write_window("raising the window", &sequence)
    }
}

impl TerminalHost for DesktopHost {
    fn focus_session(&self, session: SessionId) -> Result<(), HostError> {
        let target = self
            .sessions()
            .get(&session)
            .cloned()
            .ok_or(HostError::SessionClosed(session))?;

        match target {
            SessionTarget::Pty => self.raise_window(),
            SessionTarget::TmuxPane(pane) => {
                tmux(&["select-window", "-t", &pane])?;
                tmux(&["select-pane", "-t", &pane])
            }
            SessionTarget::Detached => Err(HostError::Unsupported("focusing a detached session")),
        }
    }

    fn reveal_panel(&self) -> Result<(), HostError> {
        self.raise_window()
    }

    fn toggle_panel(&self) -> Result<(), HostError> {
        self.write_window("de-iconifying the window", escape::WINDOW_DEICONIFY)
    }
}

fn tmux(args: &[&str]) -> Result<(), HostError> {
    let output = Command::new("tmux").args(args).output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(HostError::Command(format!(
            "tmux {}: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::screen::tests::SharedBuf;
    use crate::terminal::ScreenWriter;

    fn host_with_buffer() -> (DesktopHost, SharedBuf) {
        let buf = SharedBuf::default();
        (DesktopHost::new(Some(Box::new(buf.clone()))), buf)
    }

    #[test]
    fn test_focus_pty_session_raises_window() {
        let (host, buf) = host_with_buffer();
        let session = host.open(SessionTarget::Pty);
        host.focus_session(session).unwrap();
        assert_eq!(buf.contents(), "\x1b[1t\x1b[5t");
    }

    #[test]
    fn test_raise_waits_for_program_sequence() {
        let buf = SharedBuf::default();
        let screen = ScreenWriter::new(Box::new(buf.clone()));
        let host = DesktopHost::new(Some(Box::new(screen.overlay())));
        let session = host.open(SessionTarget::Pty);

        screen.passthrough("\x1b]0;tit".as_bytes()).unwrap();
        host.focus_session(session).unwrap();
        assert_eq!(buf.contents(), "\x1b]0;tit");

        screen.passthrough(b"le\x07").unwrap();
        assert_eq!(buf.contents(), "\x1b]0;title\x07\x1b[1t\x1b[5t");
    }

    #[test]
    fn test_focus_closed_session() {
        let (host, _buf) = host_with_buffer();
        let session = host.open(SessionTarget::Pty);
        host.close(session);
        assert!(matches!(
            host.focus_session(session),
            Err(HostError::SessionClosed(s)) if s == session
        ));
    }

    #[test]
    fn test_detached_session_cannot_focus() {
        let (host, _buf) = host_with_buffer();
        let session = host.open(SessionTarget::Detached);
        assert!(matches!(
            host.focus_session(session),
            Err(HostError::Unsupported(_))
        ));
    }

    #[test]
    fn test_toggle_only_deiconifies() {
        let (host, buf) = host_with_buffer();
        host.toggle_panel().unwrap();
        assert_eq!(buf.contents(), "\x1b[1t");
    }

    #[test]
    fn test_no_terminal_is_unsupported() {
        let host = DesktopHost::new(None);
        assert!(matches!(host.reveal_panel(), Err(HostError::Unsupported(_))));
        assert!(matches!(host.toggle_panel(), Err(HostError::Unsupported(_))));
    }
}
