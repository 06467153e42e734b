//! Terminal handling module
//!
//! Groups all terminal-related functionality:
//! - OSC notification scanning and tmux passthrough unwrapping
//! - Per-session buffering parser
//! - Output sources (PTY, stdin) and escape sequences we write ourselves
//! - The shared outer-terminal writer that keeps overlays between sequences

pub mod escape;
pub mod osc;
pub mod parser;
pub mod passthrough;
pub mod pty;
pub mod screen;
pub mod source;

pub use osc::DecodedNotification;
pub use parser::SessionParser;
pub use pty::PtySession;
pub use screen::ScreenWriter;
pub use source::{ChunkSource, PtySource, ReaderSource};
