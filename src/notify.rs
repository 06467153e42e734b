//! Notification delivery
//!
//! - `external`: sink traits and the request types passed to them
//! - `desktop`: desktop notifier backed by notify-rust / terminal-notifier
//! - `banner`: in-terminal status banner
//! - `dispatcher`: fans decoded notifications out to both sinks

mod banner;
mod desktop;
mod dispatcher;
mod external;

pub use banner::StatusBanner;
pub use desktop::CommandNotifier;
pub use dispatcher::Dispatcher;

#[cfg(test)]
pub(crate) use dispatcher::tests::{FakeExternal, FakeInApp};
