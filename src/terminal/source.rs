//! Terminal output sources
//!
//! A session's output either arrives pushed (PTY reader task feeding a
//! channel) or is pulled from a blocking reader such as stdin under
//! `tmux pipe-pane`. Both look the same downstream: ordered chunks until
//! the session ends.

use std::future::Future;
use std::io::Read;

use tokio::sync::mpsc;
use tracing::debug;

/// Size of each pull-based read
const READ_CHUNK: usize = 8192;

/// Produces ordered output chunks for one session until it ends
pub trait ChunkSource {
    /// Next chunk, or `None` once the session has ended
    fn next_chunk(&mut self) -> impl Future<Output = Option<Vec<u8>>> + Send;
}

/// Push-based source: chunks arrive on a channel from a reader task
pub struct PtySource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl PtySource {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }
}

impl ChunkSource for PtySource {
    fn next_chunk(&mut self) -> impl Future<Output = Option<Vec<u8>>> + Send {
        self.rx.recv()
    }
}

/// Pull-based source: each call performs one blocking read off the runtime
pub struct ReaderSource<R> {
    reader: Option<R>,
}

impl<R: Read + Send + 'static> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R: Read + Send + 'static> ChunkSource for ReaderSource<R> {
    fn next_chunk(&mut self) -> impl Future<Output = Option<Vec<u8>>> + Send {
        let reader = self.reader.take();
        async move {
            let mut reader = reader?;
            let (reader, chunk) = tokio::task::spawn_blocking(move || {
                let mut buf = vec![0u8; READ_CHUNK];
                let chunk = loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break None,
                        Ok(n) => {
                            buf.truncate(n);
                            break Some(buf);
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            debug!(error = %e, "reader source ended");
                            break None;
                        }
                    }
                };
                (reader, chunk)
            })
            .await
            .ok()?;
            self.reader = chunk.as_ref().map(|_| reader);
            chunk
        }
    }
}
