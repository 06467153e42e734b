//! Control socket
//!
//! Each running instance listens on `/tmp/oscbell-<instance>.sock`. Peers
//! (`oscbell focus`, `oscbell enable` ...) send one JSON line and read one
//! JSON line back.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{Overrides, Settings, SharedSettings};
use crate::focus::FocusRouter;
use crate::session::SessionToken;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum ControlMessage {
    Focus { token: SessionToken },
    Enable,
    Disable,
    Reload,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ControlReply {
    fn ok(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: Some(detail.into()),
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

pub fn socket_path(instance: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/oscbell-{}.sock", instance))
}

/// Send one message to a running instance and wait for its reply
pub async fn send(instance: &str, message: &ControlMessage) -> Result<ControlReply> {
    send_to(&socket_path(instance), message).await
}

pub async fn send_to(path: &Path, message: &ControlMessage) -> Result<ControlReply> {
    let stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("No running oscbell instance at {}", path.display()))?;
    let (read, mut write) = stream.into_split();

    let mut line = serde_json::to_string(message).context("Failed to encode message")?;
    line.push('\n');
    write.write_all(line.as_bytes()).await?;
    write.shutdown().await?;

    let mut reply = String::new();
    BufReader::new(read).read_line(&mut reply).await?;
    serde_json::from_str(reply.trim()).context("Malformed reply from oscbell instance")
}

/// Applies control messages to the running instance
pub struct ControlHandler {
    router: FocusRouter,
    settings: SharedSettings,
    /// Environment and flag overrides re-applied after a reload
    overrides: Overrides,
    config_path: PathBuf,
}

impl ControlHandler {
    pub fn new(
        router: FocusRouter,
        settings: SharedSettings,
        overrides: Overrides,
        config_path: PathBuf,
    ) -> Self {
        Self {
            router,
            settings,
            overrides,
            config_path,
        }
    }

    pub fn handle(&self, message: ControlMessage) -> ControlReply {
        match message {
            ControlMessage::Focus { token } => {
                let outcome = self.router.focus(&token);
                ControlReply::ok(format!("{:?}", outcome))
            }
            ControlMessage::Enable => {
                self.settings.update(|s| s.enabled = true);
                info!("notifications enabled");
                ControlReply::ok("enabled")
            }
            ControlMessage::Disable => {
                self.settings.update(|s| s.enabled = false);
                info!("notifications disabled");
                ControlReply::ok("disabled")
            }
            ControlMessage::Reload => match Settings::load_from(&self.config_path) {
                Ok(loaded) => {
                    // The master switch is runtime state, not file state
                    let enabled = self.settings.snapshot().enabled;
                    let mut settings = loaded.with_overrides(&self.overrides);
                    settings.enabled = enabled;
                    self.settings.replace(settings);
                    info!(path = %self.config_path.display(), "settings reloaded");
                    ControlReply::ok("reloaded")
                }
                Err(e) => {
                    warn!(error = %e, "reload failed, keeping current settings");
                    ControlReply::failed(format!("{:#}", e))
                }
            },
        }
    }
}

/// Bound control socket; the socket file is removed on drop
pub struct ControlServer {
    path: PathBuf,
    listener: UnixListener,
}

impl ControlServer {
    pub fn bind(instance: &str) -> Result<Self> {
        Self::bind_at(socket_path(instance))
    }

    pub fn bind_at(path: PathBuf) -> Result<Self> {
        if path.exists() {
            if std::os::unix::net::UnixStream::connect(&path).is_ok() {
                bail!("Another oscbell instance is listening on {}", path.display());
            }
            debug!(path = %path.display(), "removing stale socket");
            let _ = fs::remove_file(&path);
        }

        let listener = UnixListener::bind(&path)
            .with_context(|| format!("Failed to bind control socket {}", path.display()))?;
        Ok(Self { path, listener })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` flips to true
    pub async fn run(self, handler: Arc<ControlHandler>, mut shutdown: watch::Receiver<bool>) {
        info!(socket = %self.path().display(), "control socket listening");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accept = self.listener.accept() => {
                    match accept {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&handler);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, handler).await {
                                    debug!(error = %e, "control connection failed");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "control socket accept failed"),
                    }
                }
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

async fn handle_connection(stream: UnixStream, handler: Arc<ControlHandler>) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut line = String::new();
    BufReader::new(read).read_line(&mut line).await?;

    let reply = match serde_json::from_str::<ControlMessage>(line.trim()) {
        Ok(message) => {
            debug!(?message, "control message");
            // Focusing may shell out to tmux
            tokio::task::spawn_blocking(move || handler.handle(message)).await?
        }
        Err(e) => ControlReply::failed(format!("malformed message: {}", e)),
    };

    let mut out = serde_json::to_string(&reply)?;
    out.push('\n');
    write.write_all(out.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::tests::RecordingHost;
    use crate::session::{SessionId, SessionRegistry};
    use tempfile::TempDir;

    fn handler(dir: &TempDir) -> (ControlHandler, SharedSettings, Arc<SessionRegistry>, Arc<RecordingHost>) {
        let settings = SharedSettings::new(Settings::default());
        let registry = Arc::new(SessionRegistry::new());
        let host = Arc::new(RecordingHost::default());
        let router = FocusRouter::new(Arc::clone(&registry), host.clone());
        let handler = ControlHandler::new(
            router,
            settings.clone(),
            Overrides {
                in_app: Some(false),
                ..Default::default()
            },
            dir.path().join("config.toml"),
        );
        (handler, settings, registry, host)
    }

    #[test]
    fn test_message_wire_format() {
        let focus = ControlMessage::Focus {
            token: SessionToken::from("abc".to_string()),
        };
        assert_eq!(
            serde_json::to_string(&focus).unwrap(),
            r#"{"cmd":"focus","token":"abc"}"#
        );
        assert_eq!(
            serde_json::from_str::<ControlMessage>(r#"{"cmd":"disable"}"#).unwrap(),
            ControlMessage::Disable
        );
        assert!(serde_json::from_str::<ControlMessage>(r#"{"cmd":"explode"}"#).is_err());
    }

    #[test]
    fn test_enable_disable() {
        let dir = TempDir::new().unwrap();
        let (handler, settings, _, _) = handler(&dir);
        assert!(handler.handle(ControlMessage::Disable).ok);
        assert!(!settings.snapshot().enabled);
        assert!(handler.handle(ControlMessage::Enable).ok);
        assert!(settings.snapshot().enabled);
    }

    #[test]
    fn test_reload_reapplies_overrides_and_keeps_switch() {
        let dir = TempDir::new().unwrap();
        let (handler, settings, _, _) = handler(&dir);
        fs::write(
            dir.path().join("config.toml"),
            "ignore_progress_style_subtype4 = false\nshow_in_app_notification = true\n",
        )
        .unwrap();
        handler.handle(ControlMessage::Disable);

        assert!(handler.handle(ControlMessage::Reload).ok);
        let now = settings.snapshot();
        assert!(!now.ignore_progress_style_subtype4);
        assert!(!now.show_in_app_notification);
        assert!(!now.enabled);
    }

    #[test]
    fn test_bad_reload_keeps_settings() {
        let dir = TempDir::new().unwrap();
        let (handler, settings, _, _) = handler(&dir);
        fs::write(dir.path().join("config.toml"), "enabled = [").unwrap();
        let reply = handler.handle(ControlMessage::Reload);
        assert!(!reply.ok);
        assert_eq!(settings.snapshot(), Settings::default());
    }

    #[tokio::test]
    async fn test_focus_over_socket() {
        let dir = TempDir::new().unwrap();
        let (handler, _, registry, host) = handler(&dir);
        let session = SessionId::next();
        let token = registry.resolve_token(session);

        let server = ControlServer::bind_at(dir.path().join("test.sock")).unwrap();
        let path = server.path().to_path_buf();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(server.run(Arc::new(handler), stop_rx));

        let reply = send_to(&path, &ControlMessage::Focus { token }).await.unwrap();
        assert!(reply.ok);
        assert_eq!(host.calls(), vec![format!("focus {}", session)]);

        stop_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_socket_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = send_to(&dir.path().join("nobody.sock"), &ControlMessage::Enable).await;
        assert!(result.is_err());
    }
}
