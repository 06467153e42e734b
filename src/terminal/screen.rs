//! Shared outer-terminal output
//!
//! The wrapped program's bytes and our own overlays (banner, window
//! operations) go to the same terminal. Overlays may only be written
//! between the program's escape sequences and UTF-8 characters, so
//! [`ScreenWriter`] tracks where the passed-through stream stopped and
//! holds overlay bytes back until it is at ground again.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use super::osc::{BEL, ESC};

/// Overlay bytes kept while waiting for ground; older ones are dropped
const MAX_PENDING: usize = 16 * 1024;

const CAN: u8 = 0x18;
const SUB: u8 = 0x1a;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Ground,
    Escape,
    EscapeIntermediate,
    Csi,
    /// OSC / DCS / SOS / PM / APC payload. Only OSC may end on BEL.
    Text { bel_ends: bool },
    /// ESC seen inside a string payload
    TextEscape { bel_ends: bool },
}

/// Follows just enough of the VT grammar to know whether a stream ends
/// between sequences
#[derive(Clone, Debug)]
pub struct SequenceTracker {
    state: State,
    /// UTF-8 continuation bytes still expected
    utf8_pending: u8,
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self {
            state: State::Ground,
            utf8_pending: 0,
        }
    }
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing is in flight
    pub fn at_ground(&self) -> bool {
        self.state == State::Ground && self.utf8_pending == 0
    }

    pub fn feed(&mut self, data: &[u8]) {
        for &b in data {
            self.step(b);
        }
    }

    fn step(&mut self, b: u8) {
        self.state = match self.state {
            State::Ground => {
                self.step_utf8(b);
                if b == ESC {
                    State::Escape
                } else {
                    State::Ground
                }
            }
            State::Escape => Self::after_escape(b),
            State::EscapeIntermediate => match b {
                ESC => State::Escape,
                CAN | SUB => State::Ground,
                0x20..=0x2f => State::EscapeIntermediate,
                0x30..=0x7e => State::Ground,
                _ => State::EscapeIntermediate,
            },
            State::Csi => match b {
                ESC => State::Escape,
                CAN | SUB | 0x40..=0x7e => State::Ground,
                _ => State::Csi,
            },
            State::Text { bel_ends } => match b {
                ESC => State::TextEscape { bel_ends },
                BEL if bel_ends => State::Ground,
                CAN | SUB => State::Ground,
                _ => State::Text { bel_ends },
            },
            State::TextEscape { bel_ends } => match b {
                b'\\' => State::Ground,
                // Doubled ESC inside a tmux passthrough payload
                ESC => State::Text { bel_ends },
                _ => Self::after_escape(b),
            },
        };
    }

    fn after_escape(b: u8) -> State {
        match b {
            b'[' => State::Csi,
            b']' => State::Text { bel_ends: true },
            b'P' | b'X' | b'^' | b'_' => State::Text { bel_ends: false },
            ESC => State::Escape,
            0x20..=0x2f => State::EscapeIntermediate,
            _ => State::Ground,
        }
    }

    fn step_utf8(&mut self, b: u8) {
        self.utf8_pending = match b {
            0x80..=0xbf => self.utf8_pending.saturating_sub(1),
            0xc0..=0xdf => 1,
            0xe0..=0xef => 2,
            0xf0..=0xf7 => 3,
            _ => 0,
        };
    }
}

struct ScreenState {
    out: Box<dyn Write + Send>,
    tracker: SequenceTracker,
    pending: Vec<u8>,
}

impl ScreenState {
    fn flush_pending(&mut self) -> io::Result<()> {
        if self.tracker.at_ground() && !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            self.out.write_all(&pending)?;
        }
        Ok(())
    }
}

/// Outer terminal shared by the passthrough and overlays
#[derive(Clone)]
pub struct ScreenWriter {
    state: Arc<Mutex<ScreenState>>,
}

impl ScreenWriter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScreenState {
                out,
                tracker: SequenceTracker::new(),
                pending: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScreenState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Write the wrapped program's output, then any overlay that was
    /// waiting for it to reach ground
    pub fn passthrough(&self, data: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        state.out.write_all(data)?;
        state.tracker.feed(data);
        state.flush_pending()?;
        state.out.flush()
    }

    /// Writer for our own sequences
    pub fn overlay(&self) -> Overlay {
        Overlay {
            screen: self.clone(),
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.lock().pending.len()
    }
}

/// Overlay handle: writes go straight out at ground, otherwise they wait
/// for the next passthrough that ends at ground
pub struct Overlay {
    screen: ScreenWriter,
}

impl Write for Overlay {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.screen.lock();
        if state.tracker.at_ground() {
            state.out.write_all(buf)?;
        } else {
            if state.pending.len() + buf.len() > MAX_PENDING {
                state.pending.clear();
            }
            state.pending.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.screen.lock();
        if state.tracker.at_ground() {
            state.out.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cloneable in-memory terminal
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn tracked(data: &[u8]) -> SequenceTracker {
        let mut tracker = SequenceTracker::new();
        tracker.feed(data);
        tracker
    }

    #[test]
    fn test_tracker_plain_text_is_ground() {
        assert!(tracked(b"hello world\r\n").at_ground());
        assert!(tracked(b"").at_ground());
    }

    #[test]
    fn test_tracker_csi() {
        assert!(!tracked(b"\x1b").at_ground());
        assert!(!tracked(b"\x1b[3").at_ground());
        assert!(!tracked(b"\x1b[?25").at_ground());
        assert!(tracked(b"\x1b[31mRED").at_ground());
        assert!(tracked(b"\x1b[3\x18").at_ground());
    }

    #[test]
    fn test_tracker_osc_terminators() {
        assert!(!tracked(b"\x1b]0;title").at_ground());
        assert!(tracked(b"\x1b]0;title\x07").at_ground());
        assert!(!tracked(b"\x1b]0;title\x1b").at_ground());
        assert!(tracked(b"\x1b]0;title\x1b\\").at_ground());
    }

    #[test]
    fn test_tracker_dcs_ignores_bel() {
        // The inner frame's BEL does not end the tmux envelope
        let envelope = b"\x1bPtmux;\x1b\x1b]9;hi\x07";
        assert!(!tracked(envelope).at_ground());
        let mut tracker = tracked(envelope);
        tracker.feed(b"\x1b\\");
        assert!(tracker.at_ground());
    }

    #[test]
    fn test_tracker_escape_with_intermediate() {
        assert!(!tracked(b"\x1b(").at_ground());
        assert!(tracked(b"\x1b(B").at_ground());
        assert!(tracked(b"\x1b7").at_ground());
    }

    #[test]
    fn test_tracker_split_utf8() {
        let text = "日".as_bytes();
        assert!(!tracked(&text[..1]).at_ground());
        assert!(!tracked(&text[..2]).at_ground());
        assert!(tracked(text).at_ground());
    }

    #[test]
    fn test_overlay_waits_for_sequence_end() {
        let buf = SharedBuf::default();
        let screen = ScreenWriter::new(Box::new(buf.clone()));
        let mut overlay = screen.overlay();

        screen.passthrough(b"\x1b]9;done\x07\x1b[3").unwrap();
        overlay.write_all(b"\x1b7BANNER\x1b8").unwrap();
        overlay.flush().unwrap();
        assert_eq!(buf.contents(), "\x1b]9;done\x07\x1b[3");
        assert!(screen.pending() > 0);

        screen.passthrough(b"1mRED").unwrap();
        assert_eq!(
            buf.contents(),
            "\x1b]9;done\x07\x1b[31mRED\x1b7BANNER\x1b8"
        );
        assert_eq!(screen.pending(), 0);
    }

    #[test]
    fn test_overlay_at_ground_writes_immediately() {
        let buf = SharedBuf::default();
        let screen = ScreenWriter::new(Box::new(buf.clone()));
        screen.passthrough(b"$ ").unwrap();
        screen.overlay().write_all(b"\x1b[5t").unwrap();
        assert_eq!(buf.contents(), "$ \x1b[5t");
    }

    #[test]
    fn test_pending_overlay_is_bounded() {
        let buf = SharedBuf::default();
        let screen = ScreenWriter::new(Box::new(buf.clone()));
        let mut overlay = screen.overlay();
        screen.passthrough(b"\x1b]0;never ends").unwrap();
        for _ in 0..100 {
            overlay.write_all(&[b'x'; 1024]).unwrap();
        }
        assert!(screen.pending() <= MAX_PENDING);
    }
}
