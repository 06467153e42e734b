//! Escape sequences written to the outer terminal
//!
//! The wrapped program owns the screen; these are the few sequences we
//! send ourselves, for the status banner and for raising the window when a
//! notification is clicked.

// === Cursor Control ===

/// Save current cursor position (DECSC)
pub const CURSOR_SAVE: &str = "\x1b7";

/// Restore previously saved cursor position (DECRC)
pub const CURSOR_RESTORE: &str = "\x1b8";

/// Move cursor to specific row and column (1-indexed)
#[inline]
pub fn cursor_to(row: u16, col: u16) -> String {
    format!("\x1b[{};{}H", row, col)
}

/// Erase the whole current line
pub const CLEAR_LINE: &str = "\x1b[2K";

// === Text Styles ===

pub const BOLD: &str = "\x1b[1m";

pub const RESET: &str = "\x1b[0m";

/// Set foreground color using 256-color palette
#[inline]
pub fn fg(color: u8) -> String {
    format!("\x1b[38;5;{}m", color)
}

/// Set background color using 256-color palette
#[inline]
pub fn bg(color: u8) -> String {
    format!("\x1b[48;5;{}m", color)
}

pub mod color {
    /// Cyan (45) - banner title
    pub const CYAN: u8 = 45;

    /// Gray (245) - banner action hint
    pub const GRAY: u8 = 245;

    /// Dark background (236)
    pub const BG_DARK: u8 = 236;
}

// === Window Control (XTWINOPS) ===

/// De-iconify the terminal window (CSI 1 t)
pub const WINDOW_DEICONIFY: &str = "\x1b[1t";

/// Raise the terminal window to the front (CSI 5 t)
pub const WINDOW_RAISE: &str = "\x1b[5t";

/// Set the outer window title (OSC 2)
///
/// Control characters are stripped so the title cannot terminate the
/// sequence early.
#[inline]
pub fn window_title(title: &str) -> String {
    let clean: String = title.chars().filter(|c| !c.is_control()).collect();
    format!("\x1b]2;{}\x07", clean)
}
