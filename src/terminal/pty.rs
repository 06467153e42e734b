use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::env;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

/// A child program running inside a pseudo-terminal.
///
/// Output is read on a blocking task and sent, in order, over the channel
/// given to [`PtySession::spawn`].
pub struct PtySession {
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
}

fn lock<T: ?Sized>(m: &Mutex<Box<T>>) -> MutexGuard<'_, Box<T>> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl PtySession {
    pub fn spawn(
        output_tx: mpsc::Sender<Vec<u8>>,
        cols: u16,
        rows: u16,
        program: &str,
        args: &[String],
    ) -> Result<Self> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open pty")?;

        let mut cmd = CommandBuilder::new(program);
        for arg in args {
            cmd.arg(arg);
        }

        if let Ok(cwd) = env::current_dir() {
            cmd.cwd(cwd);
        }

        // Inherit all environment variables from parent process
        for (key, value) in env::vars() {
            cmd.env(key, value);
        }
        if env::var_os("TERM").is_none() {
            cmd.env("TERM", "xterm-256color");
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to start {}", program))?;
        let child = Arc::new(Mutex::new(child));

        let reader = pair.master.try_clone_reader()?;
        let writer = pair.master.take_writer()?;

        tokio::task::spawn_blocking(move || Self::read_loop(reader, output_tx));

        Ok(Self {
            master: Arc::new(Mutex::new(pair.master)),
            writer: Arc::new(Mutex::new(writer)),
            child,
        })
    }

    fn read_loop(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Vec<u8>>) {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // EIO is how Linux reports the slave side closing
                    debug!(error = %e, "pty read ended");
                    break;
                }
            }
        }
    }

    /// Handle for writing keyboard input from another thread
    pub fn input(&self) -> PtyInput {
        PtyInput {
            writer: Arc::clone(&self.writer),
        }
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        lock(&self.master).resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })?;
        Ok(())
    }

    /// Block until the child exits and return its exit code
    pub fn wait(&self) -> Result<u32> {
        let status = lock(&self.child).wait()?;
        Ok(status.exit_code())
    }
}

/// Cloneable writer into the PTY
#[derive(Clone)]
pub struct PtyInput {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PtyInput {
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut writer = lock(&self.writer);
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }
}
