//! In-terminal notification banner
//!
//! Draws a one-line banner on the bottom row of the outer terminal and
//! puts the message in the window title. The wrapped program keeps
//! drawing over it; the banner is a glance, not a dialog, so its action is
//! never selectable from here.

use std::io::Write;
use std::sync::Mutex;

use unicode_width::UnicodeWidthChar;

use super::external::{InAppNotifier, NotifyError, SelectionCallback};
use crate::terminal::escape::{self, color};
use crate::terminal::ScreenWriter;

pub struct StatusBanner {
    out: Mutex<Box<dyn Write + Send>>,
    /// Returns (cols, rows) of the outer terminal
    size: Box<dyn Fn() -> Option<(u16, u16)> + Send + Sync>,
}

impl StatusBanner {
    pub fn new(
        out: Box<dyn Write + Send>,
        size: impl Fn() -> Option<(u16, u16)> + Send + Sync + 'static,
    ) -> Self {
        Self {
            out: Mutex::new(out),
            size: Box::new(size),
        }
    }

    /// Banner drawn as an overlay on the shared screen, sized from the
    /// controlling terminal
    pub fn on_screen(screen: &ScreenWriter) -> Self {
        Self::new(Box::new(screen.overlay()), || {
            crossterm::terminal::size().ok()
        })
    }

    fn render(&self, text: &str, action_label: &str, cols: u16, rows: u16) -> String {
        let hint = format!("  [{}]", action_label);
        let budget = (cols as usize).saturating_sub(hint.chars().count() + 2);
        let message = fit_width(&sanitize(text), budget);

        format!(
            "{save}{to}{clear}{bg}{bold}{cyan} {message}{reset}{bg}{gray}{hint}{reset}{restore}{title}",
            save = escape::CURSOR_SAVE,
            to = escape::cursor_to(rows, 1),
            clear = escape::CLEAR_LINE,
            bg = escape::bg(color::BG_DARK),
            bold = escape::BOLD,
            cyan = escape::fg(color::CYAN),
            gray = escape::fg(color::GRAY),
            reset = escape::RESET,
            restore = escape::CURSOR_RESTORE,
            title = escape::window_title(text),
        )
    }
}

// The banner takes no input, so the selection callback is dropped unused
impl InAppNotifier for StatusBanner {
    fn show_message(
        &self,
        text: &str,
        action_label: &str,
        _on_select: SelectionCallback,
    ) -> Result<(), NotifyError> {
        let Some((cols, rows)) = (self.size)() else {
            return Err(NotifyError::Unsupported("a banner without a terminal"));
        };
        let rendered = self.render(text, action_label, cols, rows);
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        out.write_all(rendered.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Replace control characters so notification text cannot inject
/// sequences into the outer terminal
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Truncate to `max` display columns, marking the cut with an ellipsis
fn fit_width(text: &str, max: usize) -> String {
    let total: usize = text.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}
