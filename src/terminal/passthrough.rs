//! tmux DCS passthrough unwrapping
//!
//! tmux forwards an inner program's escape sequences to the outer terminal
//! wrapped as `ESC P tmux; <payload> ESC \`, with every ESC inside the
//! payload doubled. Unwrapping replaces each envelope with its payload so
//! the OSC scanner sees the inner sequence as if it had been written
//! directly.

use super::osc::{find_from, ESC, ST};

/// ESC P tmux; - start of a passthrough envelope
pub const ENVELOPE_START: &[u8] = b"\x1bPtmux;";

/// Replace every complete envelope in `buf` with its unescaped payload.
///
/// Loops until no complete envelope remains, so adjacent and nested
/// envelopes are all handled in one call. Returns the offset of an
/// envelope whose terminator has not arrived yet; bytes from there on must
/// be held back until more input arrives.
pub fn unwrap_envelopes(buf: &mut Vec<u8>) -> Option<usize> {
    let mut from = 0;
    loop {
        let start = find_from(buf, ENVELOPE_START, from)?;
        let payload_start = start + ENVELOPE_START.len();

        let Some(payload_len) = envelope_end(&buf[payload_start..]) else {
            return Some(start);
        };
        let payload_end = payload_start + payload_len;

        let inner = undouble_escapes(&buf[payload_start..payload_end]);
        // Every splice removes the marker and terminator, so the buffer
        // strictly shrinks and the loop terminates.
        buf.splice(start..payload_end + ST.len(), inner);

        // The payload may itself start with an envelope (nesting)
        from = start;
    }
}

/// Length of the payload before the envelope's terminating ST.
///
/// A doubled ESC is an escaped literal and never starts the terminator,
/// so an inner ST (sent as ESC ESC \) does not close the envelope early.
fn envelope_end(payload: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < payload.len() {
        if payload[i] != ESC {
            i += 1;
            continue;
        }
        match payload.get(i + 1) {
            Some(&ESC) => i += 2,
            Some(&b'\\') => return Some(i),
            Some(_) => i += 1,
            None => return None,
        }
    }
    None
}

/// Collapse ESC ESC pairs back into a single ESC
fn undouble_escapes(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        out.push(payload[i]);
        if payload[i] == ESC && payload.get(i + 1) == Some(&ESC) {
            i += 2;
        } else {
            i += 1;
        }
    }
    out
}
