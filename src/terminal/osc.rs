//! OSC (Operating System Command) notification scanner
//!
//! Finds complete OSC frames (ESC ] ... BEL or ESC ] ... ESC \) in a byte
//! buffer and decodes the two notification encodings terminals understand:
//! - OSC 9 ; body                       (iTerm2 / Ghostty style)
//! - OSC 777 ; notify ; title ; body    (urxvt style)
//!
//! Everything here is stateless; buffering across chunks lives in
//! [`super::parser::SessionParser`].

use std::ops::Range;

pub const ESC: u8 = 0x1b;
pub const BEL: u8 = 0x07;

/// ESC ] - start of an OSC frame
pub const OSC_START: &[u8] = b"\x1b]";

/// ESC \ - string terminator
pub const ST: &[u8] = b"\x1b\\";

/// Label used when a notification carries no title of its own
pub const DEFAULT_TITLE: &str = "Terminal";

/// Which encoding a notification arrived in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    /// OSC 9: body only
    Progress,
    /// OSC 777 ; notify: explicit title plus body
    Labeled,
}

/// A notification request recovered from terminal output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedNotification {
    pub kind: NotificationKind,
    /// Only ever set for [`NotificationKind::Labeled`]; never empty
    pub title: Option<String>,
    pub body: String,
}

impl DecodedNotification {
    pub fn progress(body: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Progress,
            title: None,
            body: body.into(),
        }
    }

    pub fn labeled(title: Option<String>, body: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Labeled,
            title: title.filter(|t| !t.is_empty()),
            body: body.into(),
        }
    }

    /// Title to show the user. Progress-style frames always use `generic`.
    pub fn display_title<'a>(&'a self, generic: &'a str) -> &'a str {
        match self.kind {
            NotificationKind::Labeled => self.title.as_deref().unwrap_or(generic),
            NotificationKind::Progress => generic,
        }
    }
}

/// Result of looking for the next OSC frame in a buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameScan {
    /// A terminated frame. `content` excludes the start marker and
    /// terminator; `consumed` covers everything up to and including the
    /// terminator.
    Complete {
        content: Range<usize>,
        consumed: usize,
    },
    /// Start marker at `start` but no terminator yet
    Incomplete { start: usize },
    /// No start marker anywhere
    Absent,
}

/// Position of `needle` in `haystack` at or after `from`
pub fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

/// Locate the next OSC frame. Whichever terminator (BEL or ST) comes
/// first after the start marker ends the frame.
pub fn scan_frame(buf: &[u8]) -> FrameScan {
    let Some(start) = find_from(buf, OSC_START, 0) else {
        return FrameScan::Absent;
    };
    let after_start = start + OSC_START.len();

    let bel = buf[after_start..]
        .iter()
        .position(|&b| b == BEL)
        .map(|pos| pos + after_start);
    let st = find_from(buf, ST, after_start);

    let (end, terminator_len) = match (bel, st) {
        (Some(bel), Some(st)) if st < bel => (st, ST.len()),
        (Some(bel), _) => (bel, 1),
        (None, Some(st)) => (st, ST.len()),
        (None, None) => return FrameScan::Incomplete { start },
    };

    FrameScan::Complete {
        content: after_start..end,
        consumed: end + terminator_len,
    }
}

/// Decode the content of one OSC frame.
///
/// Returns `None` for frames that are not notifications, are malformed,
/// or carry nothing to show. With `suppress_progress` set, OSC 9;4
/// progress reports are dropped.
pub fn decode_frame(content: &[u8], suppress_progress: bool) -> Option<DecodedNotification> {
    let text = String::from_utf8_lossy(content);
    let s = text.trim();

    if let Some(rest) = s.strip_prefix("9;") {
        if suppress_progress && rest.starts_with("4;") {
            return None;
        }
        let body = rest.trim();
        return (!body.is_empty()).then(|| DecodedNotification::progress(body));
    }

    if s.starts_with("777;") {
        let parts: Vec<&str> = s.split(';').collect();
        if parts.len() < 2 || parts[1].to_lowercase() != "notify" {
            return None;
        }
        let title = parts.get(2).copied();
        let body = if parts.len() >= 4 {
            parts[3..].join(";")
        } else {
            String::new()
        };
        // An absent title falls back to the default label; an explicitly
        // empty one only passes with a body.
        if title == Some("") && body.is_empty() {
            return None;
        }
        return Some(DecodedNotification::labeled(
            title.map(str::to_string),
            body,
        ));
    }

    None
}
