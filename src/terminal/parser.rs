//! Per-session notification parser
//!
//! Buffers terminal output across arbitrary chunk boundaries (mid-escape,
//! mid-envelope, mid-UTF-8) and yields every notification frame once it is
//! complete. Memory stays bounded even when a program never terminates a
//! sequence.

use tracing::debug;

use super::osc::{self, DecodedNotification, FrameScan};
use super::passthrough;

/// Hard ceiling on buffered bytes
pub const MAX_BUFFER: usize = 256 * 1024;

/// What survives when the hard ceiling is hit (most recent bytes)
pub const TRUNCATED_BUFFER: usize = 128 * 1024;

/// Plain output kept between frames when no sequence is in flight
pub const IDLE_BUFFER: usize = 4 * 1024;

pub struct SessionParser {
    buffer: Vec<u8>,
    suppress_progress: bool,
}

impl SessionParser {
    pub fn new(suppress_progress: bool) -> Self {
        Self {
            buffer: Vec::with_capacity(IDLE_BUFFER),
            suppress_progress,
        }
    }

    /// Drop OSC 9;4 progress reports instead of surfacing them
    pub fn set_suppress_progress(&mut self, suppress: bool) {
        self.suppress_progress = suppress;
    }

    /// Bytes currently held back waiting for more input
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk and return every notification it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedNotification> {
        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() > MAX_BUFFER {
            let dropped = self.buffer.len() - TRUNCATED_BUFFER;
            self.buffer.drain(..dropped);
            debug!(dropped, "parse buffer overflow, kept most recent bytes");
        }

        let pending_envelope = passthrough::unwrap_envelopes(&mut self.buffer);
        // Nothing inside an unterminated envelope is scanned yet
        let mut limit = pending_envelope.unwrap_or(self.buffer.len());

        let mut notifications = Vec::new();
        loop {
            match osc::scan_frame(&self.buffer[..limit]) {
                FrameScan::Complete { content, consumed } => {
                    if let Some(n) = osc::decode_frame(&self.buffer[content], self.suppress_progress)
                    {
                        notifications.push(n);
                    }
                    self.buffer.drain(..consumed);
                    limit -= consumed;
                }
                FrameScan::Incomplete { start } => {
                    self.buffer.drain(..start);
                    break;
                }
                FrameScan::Absent => {
                    if pending_envelope.is_some() {
                        self.buffer.drain(..limit);
                    } else if self.buffer.len() > IDLE_BUFFER {
                        let excess = self.buffer.len() - IDLE_BUFFER;
                        self.buffer.drain(..excess);
                    }
                    break;
                }
            }
        }

        notifications
    }
}

impl Default for SessionParser {
    fn default() -> Self {
        Self::new(true)
    }
}
