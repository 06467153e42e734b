//! oscbell App - one activation
//!
//! Architecture:
//! - Run the user's command in a PTY sized like the outer terminal
//! - PTY output passes through to stdout untouched, and is also fed to the
//!   monitor, which raises notifications for OSC 9 / OSC 777 requests
//! - Our own banner and window operations share stdout through a
//!   [`ScreenWriter`], which holds them back while a sequence is open
//! - Keyboard input is forwarded to the PTY byte for byte
//! - A control socket accepts focus/enable/disable/reload from peers
//!
//! `watch` mode skips the PTY and reads a session's output from stdin.

use std::io::{stdin, stdout, IsTerminal, Read, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::terminal::size as terminal_size;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Overrides, Settings, SharedSettings};
use crate::focus::FocusRouter;
use crate::host::{DesktopHost, SessionTarget};
use crate::ipc::{ControlHandler, ControlServer};
use crate::monitor::Monitor;
use crate::notify::{CommandNotifier, Dispatcher, StatusBanner};
use crate::session::{SessionId, SessionRegistry};
use crate::terminal::{ChunkSource, PtySession, PtySource, ReaderSource, ScreenWriter};

pub struct App {
    pub instance: String,
    settings: SharedSettings,
    screen: ScreenWriter,
    host: Arc<DesktopHost>,
    monitor: Monitor,
    control: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

/// Resolve settings: config file, then environment, then flags
fn resolve_settings(overrides: &Overrides) -> Settings {
    let file = Settings::load().unwrap_or_else(|e| {
        let error = format!("{:#}", e);
        warn!(%error, "ignoring unreadable config");
        Settings::default()
    });
    file.with_overrides(overrides)
}

impl App {
    pub fn new(instance: String, overrides: Overrides) -> Self {
        let overrides = Overrides::from_env().merge(&overrides);
        let settings = SharedSettings::new(resolve_settings(&overrides));

        let screen = ScreenWriter::new(Box::new(stdout()));
        let window: Option<Box<dyn Write + Send>> = if stdout().is_terminal() {
            Some(Box::new(screen.overlay()))
        } else {
            None
        };

        let registry = Arc::new(SessionRegistry::new());
        let host = Arc::new(DesktopHost::new(window));
        let router = FocusRouter::new(Arc::clone(&registry), host.clone());
        let dispatcher = Dispatcher::new(
            settings.clone(),
            Arc::new(CommandNotifier::detect()),
            Arc::new(StatusBanner::on_screen(&screen)),
            router.clone(),
            instance.clone(),
        );
        let monitor = Monitor::new(settings.clone(), registry, dispatcher);
        let control = start_control(&instance, router, settings.clone(), overrides);

        Self {
            instance,
            settings,
            screen,
            host,
            monitor,
            control,
        }
    }

    /// Run `program` in a PTY until it exits. Returns its exit code.
    /// The outer terminal must already be in raw mode.
    pub async fn run_wrapped(&mut self, program: &str, args: &[String]) -> Result<u32> {
        let (cols, rows) = terminal_size().context("Failed to read terminal size")?;
        let (pty_tx, pty_rx) = mpsc::channel(256);
        let pty = Arc::new(PtySession::spawn(pty_tx, cols, rows, program, args)?);
        info!(program, ?args, cols, rows, "started");

        let session = self.host.open(SessionTarget::Pty);
        spawn_input_forwarder(&pty);
        let resizer = spawn_resizer(Arc::clone(&pty))?;

        let mut source = PtySource::new(pty_rx);
        let screen = self.screen.clone();
        let result = self
            .pump(&mut source, session, |data| Ok(screen.passthrough(data)?))
            .await;

        resizer.abort();
        self.end_session(session);
        result?;

        let code = tokio::task::spawn_blocking(move || pty.wait()).await??;
        info!(code, "child exited");
        Ok(code)
    }

    /// Watch a session whose output arrives on stdin
    pub async fn watch(&mut self, pane: Option<String>) -> Result<()> {
        let target = match pane {
            Some(pane) => SessionTarget::TmuxPane(pane),
            None => SessionTarget::Detached,
        };
        let title = self.settings.snapshot().default_title;
        info!(?target, %title, "watching stdin");
        let session = self.host.open(target);

        let mut source = ReaderSource::new(stdin());
        let result = self.pump(&mut source, session, |_| Ok(())).await;
        self.end_session(session);
        result
    }

    /// Drain `source`, handing each chunk to `passthrough` and then to the
    /// monitor, until the session ends
    async fn pump<S: ChunkSource>(
        &mut self,
        source: &mut S,
        session: SessionId,
        mut passthrough: impl FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        while let Some(chunk) = source.next_chunk().await {
            passthrough(&chunk)?;
            let raised = self.monitor.feed(session, &chunk);
            if raised > 0 {
                debug!(%session, raised, "notifications raised");
            }
        }
        Ok(())
    }

    fn end_session(&mut self, session: SessionId) {
        self.monitor.close(session);
        self.host.close(session);
    }

    /// Deactivate: stop the control socket and drop all session state
    pub async fn shutdown(mut self) {
        if let Some((stop, task)) = self.control.take() {
            let _ = stop.send(true);
            let _ = task.await;
        }
        self.monitor.shutdown();
        info!(instance = %self.instance, "shut down");
    }
}

/// Bind the control socket. Notifications still work without it, only
/// deep links and control commands do not.
fn start_control(
    instance: &str,
    router: FocusRouter,
    settings: SharedSettings,
    overrides: Overrides,
) -> Option<(watch::Sender<bool>, JoinHandle<()>)> {
    let config_path = match Settings::config_path() {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "no config path, control socket disabled");
            return None;
        }
    };
    let server = match ControlServer::bind(instance) {
        Ok(server) => server,
        Err(e) => {
            let error = format!("{:#}", e);
            warn!(%error, "control socket disabled");
            return None;
        }
    };

    let handler = Arc::new(ControlHandler::new(router, settings, overrides, config_path));
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(server.run(handler, stop_rx));
    Some((stop_tx, task))
}

/// Forward raw stdin bytes to the PTY. The thread blocks on stdin and is
/// left behind when the child exits.
fn spawn_input_forwarder(pty: &PtySession) {
    let input = pty.input();
    std::thread::spawn(move || {
        let mut stdin = stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if input.write(&buf[..n]).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "stdin closed");
                    break;
                }
            }
        }
    });
}

/// Keep the PTY the size of the outer terminal
fn spawn_resizer(pty: Arc<PtySession>) -> Result<JoinHandle<()>> {
    let mut winch = signal(SignalKind::window_change()).context("Failed to watch SIGWINCH")?;
    Ok(tokio::spawn(async move {
        while winch.recv().await.is_some() {
            match terminal_size() {
                Ok((cols, rows)) => {
                    if let Err(e) = pty.resize(cols, rows) {
                        debug!(error = %e, "pty resize failed");
                    }
                }
                Err(e) => debug!(error = %e, "terminal size unavailable"),
            }
        }
    }))
}
