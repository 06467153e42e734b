//! Desktop notifications
//!
//! - Linux/BSD: freedesktop notifications through `notify-rust`, with a
//!   "default" action so clicks come back to us directly
//! - macOS: `terminal-notifier`, with the focus deep link run via
//!   `-execute`; plain `osascript` when terminal-notifier is missing
//!
//! Waiting for clicks and reaping helpers happens on background threads;
//! `display` only waits until the notification is handed off.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use super::external::{
    ClickHandler, ClickSlot, DisplayRequest, ExternalNotifier, NotifyError,
};

const APP_NAME: &str = "oscbell";

/// Action key invoked when the notification body is clicked
const CLICK_ACTION: &str = "default";

/// Which service shows notifications
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// org.freedesktop.Notifications over D-Bus
    Freedesktop,
    TerminalNotifier,
    Unsupported,
}

impl Backend {
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::TerminalNotifier
        } else if cfg!(unix) {
            Self::Freedesktop
        } else {
            Self::Unsupported
        }
    }
}

pub struct CommandNotifier {
    backend: Backend,
    /// Our own executable, for deep links run by terminal-notifier
    exe: Option<PathBuf>,
    clicks: Arc<ClickSlot>,
}

impl CommandNotifier {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            exe: std::env::current_exe().ok(),
            clicks: Arc::new(ClickSlot::default()),
        }
    }

    pub fn detect() -> Self {
        Self::new(Backend::detect())
    }

    /// Show on the notification server, then wait for a click on a
    /// background thread. Errors from the server are still returned here.
    #[cfg(all(unix, not(target_os = "macos")))]
    fn show_freedesktop(&self, request: DisplayRequest) -> Result<(), NotifyError> {
        use std::sync::mpsc;

        let notification = freedesktop_notification(&request);
        let token = request.hints.click_token;
        let clicks = Arc::clone(&self.clicks);
        let (shown_tx, shown_rx) = mpsc::channel();

        thread::spawn(move || {
            let handle = match notification.show() {
                Ok(handle) => {
                    let _ = shown_tx.send(Ok(()));
                    handle
                }
                Err(e) => {
                    let _ = shown_tx.send(Err(e.to_string()));
                    return;
                }
            };
            // Without a token there is no action to wait for
            let Some(token) = token else {
                return;
            };
            handle.wait_for_action(|action| {
                if action == CLICK_ACTION {
                    clicks.fire(token);
                } else {
                    debug!(action, "notification closed without a click");
                }
            });
        });

        match shown_rx.recv() {
            Ok(shown) => shown.map_err(NotifyError::Desktop),
            Err(_) => Err(NotifyError::Desktop(
                "notification thread exited".to_string(),
            )),
        }
    }

    #[cfg(not(all(unix, not(target_os = "macos"))))]
    fn show_freedesktop(&self, _request: DisplayRequest) -> Result<(), NotifyError> {
        Err(NotifyError::Unsupported(std::env::consts::OS))
    }

    fn show_terminal_notifier(&self, request: DisplayRequest) -> Result<(), NotifyError> {
        let args = terminal_notifier_args(&request, self.exe.as_deref());
        match Command::new("terminal-notifier")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                reap("terminal-notifier", child);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("terminal-notifier not installed, using osascript");
                let child = Command::new("osascript")
                    .arg("-e")
                    .arg(applescript_notification(&request))
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|source| NotifyError::Spawn {
                        helper: "osascript",
                        source,
                    })?;
                reap("osascript", child);
                Ok(())
            }
            Err(source) => Err(NotifyError::Spawn {
                helper: "terminal-notifier",
                source,
            }),
        }
    }
}

impl ExternalNotifier for CommandNotifier {
    fn display(&self, request: DisplayRequest) -> Result<(), NotifyError> {
        match self.backend {
            Backend::Freedesktop => self.show_freedesktop(request),
            Backend::TerminalNotifier => self.show_terminal_notifier(request),
            Backend::Unsupported => Err(NotifyError::Unsupported(std::env::consts::OS)),
        }
    }

    fn supports_click(&self) -> bool {
        self.backend == Backend::Freedesktop
    }

    fn install_click_handler(&self, handler: ClickHandler) -> bool {
        self.clicks.install(handler)
    }
}

/// Wait for a helper in the background and log a failure exit
fn reap(helper: &'static str, mut child: Child) {
    thread::spawn(move || match child.wait() {
        Ok(status) if !status.success() => {
            let error = NotifyError::Failed {
                helper,
                code: status.code(),
            };
            warn!(%error, "notification helper failed");
        }
        Ok(_) => {}
        Err(e) => debug!(helper, error = %e, "failed to wait for notification helper"),
    });
}

#[cfg(all(unix, not(target_os = "macos")))]
fn freedesktop_notification(request: &DisplayRequest) -> notify_rust::Notification {
    let mut notification = notify_rust::Notification::new();
    notification
        .appname(APP_NAME)
        .summary(&request.title)
        .body(&request.body);
    if let Some(icon) = &request.hints.icon {
        notification.icon(&icon.display().to_string());
    }
    if request.hints.click_token.is_some() {
        notification.action(CLICK_ACTION, "Focus");
    }
    notification
}

fn terminal_notifier_args(request: &DisplayRequest, exe: Option<&std::path::Path>) -> Vec<String> {
    let mut args = vec![
        "-title".to_string(),
        request.title.clone(),
        "-message".to_string(),
        request.body.clone(),
    ];
    if let Some(sender) = &request.hints.sender {
        args.push("-sender".to_string());
        args.push(sender.clone());
    }
    if let Some(activate) = &request.hints.activate_id {
        args.push("-activate".to_string());
        args.push(activate.clone());
    }
    if let Some(icon) = &request.hints.icon {
        args.push("-contentImage".to_string());
        args.push(icon.display().to_string());
    }
    if let (Some(uri), Some(exe)) = (&request.hints.open_uri, exe) {
        args.push("-execute".to_string());
        args.push(format!(
            "{} focus {}",
            shell_quote(&exe.display().to_string()),
            shell_quote(uri)
        ));
    }
    args
}

/// Single-quote a string for /bin/sh
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Escape a string for safe embedding inside an AppleScript double-quoted string.
///
/// Backslashes must be escaped first so the later replacements are not
/// double-escaped.
fn escape_for_applescript(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn applescript_notification(request: &DisplayRequest) -> String {
    format!(
        r#"display notification "{}" with title "{}""#,
        escape_for_applescript(&request.body),
        escape_for_applescript(&request.title),
    )
}
