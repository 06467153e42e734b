//! Notification dispatch
//!
//! Fans a decoded notification out to the desktop notifier and the in-app
//! banner. Each sink is gated by its own setting and isolated from the
//! other: an error or panic in one is logged and never stops the other.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::external::{
    DisplayRequest, ExternalNotifier, InAppNotifier, NotifyError, PlatformHints,
};
use crate::config::{Settings, SharedSettings};
use crate::deeplink;
use crate::focus::FocusRouter;
use crate::session::SessionToken;
use crate::terminal::DecodedNotification;

/// Action offered by the in-app notification
pub const FOCUS_ACTION: &str = "Focus Terminal";

/// What happened at one sink
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkOutcome {
    Delivered,
    Disabled,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    pub external: SinkOutcome,
    pub in_app: SinkOutcome,
}

pub struct Dispatcher {
    settings: SharedSettings,
    external: Arc<dyn ExternalNotifier>,
    in_app: Arc<dyn InAppNotifier>,
    router: FocusRouter,
    /// Authority used in focus deep links
    instance: String,
}

impl Dispatcher {
    /// Create the dispatcher and route desktop notification clicks to
    /// `router`. The notifier keeps whichever click handler it got first.
    pub fn new(
        settings: SharedSettings,
        external: Arc<dyn ExternalNotifier>,
        in_app: Arc<dyn InAppNotifier>,
        router: FocusRouter,
        instance: impl Into<String>,
    ) -> Self {
        let click_router = router.clone();
        let installed = external.install_click_handler(Arc::new(move |token| {
            click_router.focus(&token);
        }));
        if !installed {
            debug!("click handler already installed");
        }

        Self {
            settings,
            external,
            in_app,
            router,
            instance: instance.into(),
        }
    }

    pub fn dispatch(&self, notification: &DecodedNotification, token: &SessionToken) -> DispatchReport {
        let settings = self.settings.snapshot();
        let title = notification.display_title(&settings.default_title).to_string();
        let body = notification.body.clone();

        let external = if settings.prefer_external_notifications {
            let request = self.display_request(&settings, title.clone(), body.clone(), token);
            guarded("external", || self.external.display(request))
        } else {
            SinkOutcome::Disabled
        };

        let in_app = if settings.show_in_app_notification {
            let text = in_app_text(&title, &body);
            let router = self.router.clone();
            let token = token.clone();
            guarded("in-app", || {
                self.in_app.show_message(
                    &text,
                    FOCUS_ACTION,
                    Box::new(move || {
                        router.focus(&token);
                    }),
                )
            })
        } else {
            SinkOutcome::Disabled
        };

        DispatchReport { external, in_app }
    }

    fn display_request(
        &self,
        settings: &Settings,
        title: String,
        body: String,
        token: &SessionToken,
    ) -> DisplayRequest {
        let open_uri = if self.external.supports_click() {
            None
        } else {
            match deeplink::focus_uri(&self.instance, token) {
                Ok(uri) => Some(uri.to_string()),
                Err(e) => {
                    warn!(error = %e, instance = %self.instance, "cannot build focus link");
                    None
                }
            }
        };

        DisplayRequest {
            title,
            body,
            token: token.clone(),
            hints: PlatformHints {
                icon: settings.icon.clone(),
                sender: settings.sender.clone(),
                activate_id: settings.activate_id.clone(),
                click_token: Some(token.clone()),
                open_uri,
            },
        }
    }
}

fn in_app_text(title: &str, body: &str) -> String {
    if body.is_empty() {
        title.to_string()
    } else {
        format!("{}: {}", title, body)
    }
}

/// Run one sink call, turning errors and panics into a logged failure
fn guarded(sink: &'static str, call: impl FnOnce() -> Result<(), NotifyError>) -> SinkOutcome {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => SinkOutcome::Delivered,
        Ok(Err(e)) => {
            warn!(sink, error = %e, "notification sink failed");
            SinkOutcome::Failed
        }
        Err(_) => {
            error!(sink, "notification sink panicked");
            SinkOutcome::Failed
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::focus::tests::RecordingHost;
    use crate::notify::external::{ClickHandler, ClickSlot, SelectionCallback};
    use crate::session::{SessionId, SessionRegistry};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct FakeExternal {
        pub shown: Mutex<Vec<DisplayRequest>>,
        pub clicks: ClickSlot,
        pub click_capable: bool,
        pub fail: bool,
    }

    impl ExternalNotifier for FakeExternal {
        fn display(&self, request: DisplayRequest) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Unsupported("test"));
            }
            self.shown.lock().unwrap().push(request);
            Ok(())
        }

        fn supports_click(&self) -> bool {
            self.click_capable
        }

        fn install_click_handler(&self, handler: ClickHandler) -> bool {
            self.clicks.install(handler)
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeInApp {
        pub shown: Mutex<Vec<String>>,
        pub select: bool,
        pub panic: bool,
    }

    impl InAppNotifier for FakeInApp {
        fn show_message(
            &self,
            text: &str,
            action_label: &str,
            on_select: SelectionCallback,
        ) -> Result<(), NotifyError> {
            if self.panic {
                panic!("banner exploded");
            }
            self.shown
                .lock()
                .unwrap()
                .push(format!("{} [{}]", text, action_label));
            if self.select {
                on_select();
            }
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        settings: SharedSettings,
        registry: Arc<SessionRegistry>,
        host: Arc<RecordingHost>,
        external: Arc<FakeExternal>,
        in_app: Arc<FakeInApp>,
    }

    fn fixture(external: FakeExternal, in_app: FakeInApp) -> Fixture {
        let settings = SharedSettings::new(Settings::default());
        let registry = Arc::new(SessionRegistry::new());
        let host = Arc::new(RecordingHost::default());
        let router = FocusRouter::new(Arc::clone(&registry), host.clone());
        let external = Arc::new(external);
        let in_app = Arc::new(in_app);
        let dispatcher = Dispatcher::new(
            settings.clone(),
            external.clone(),
            in_app.clone(),
            router,
            "abc123",
        );
        Fixture {
            dispatcher,
            settings,
            registry,
            host,
            external,
            in_app,
        }
    }

    #[test]
    fn test_labeled_notification_reaches_both_sinks() {
        let f = fixture(
            FakeExternal {
                click_capable: true,
                ..Default::default()
            },
            FakeInApp::default(),
        );
        let token = f.registry.resolve_token(SessionId::next());
        let n = DecodedNotification::labeled(Some("Build".to_string()), "Done");

        let report = f.dispatcher.dispatch(&n, &token);
        assert_eq!(report.external, SinkOutcome::Delivered);
        assert_eq!(report.in_app, SinkOutcome::Delivered);

        let shown = f.external.shown.lock().unwrap();
        assert_eq!(shown[0].title, "Build");
        assert_eq!(shown[0].body, "Done");
        assert_eq!(shown[0].token, token);
        assert_eq!(shown[0].hints.click_token.as_ref(), Some(&token));
        assert_eq!(shown[0].hints.open_uri, None);
        assert_eq!(
            *f.in_app.shown.lock().unwrap(),
            vec!["Build: Done [Focus Terminal]".to_string()]
        );
    }

    #[test]
    fn test_progress_notification_uses_generic_title() {
        let f = fixture(FakeExternal::default(), FakeInApp::default());
        let token = SessionToken::mint();
        f.dispatcher
            .dispatch(&DecodedNotification::progress("hello"), &token);
        assert_eq!(f.external.shown.lock().unwrap()[0].title, "Terminal");
        assert_eq!(
            f.in_app.shown.lock().unwrap()[0],
            "Terminal: hello [Focus Terminal]"
        );
    }

    #[test]
    fn test_deep_link_when_clicks_unavailable() {
        let f = fixture(FakeExternal::default(), FakeInApp::default());
        let token = SessionToken::mint();
        f.dispatcher
            .dispatch(&DecodedNotification::progress("x"), &token);
        let uri = f.external.shown.lock().unwrap()[0].hints.open_uri.clone().unwrap();
        let link = deeplink::parse_focus_uri(&uri).unwrap();
        assert_eq!(link.instance, "abc123");
        assert_eq!(link.token, token);
    }

    #[test]
    fn test_sinks_respect_settings() {
        let f = fixture(FakeExternal::default(), FakeInApp::default());
        f.settings.update(|s| s.prefer_external_notifications = false);
        let report = f
            .dispatcher
            .dispatch(&DecodedNotification::progress("x"), &SessionToken::mint());
        assert_eq!(report.external, SinkOutcome::Disabled);
        assert_eq!(report.in_app, SinkOutcome::Delivered);
        assert!(f.external.shown.lock().unwrap().is_empty());

        f.settings.update(|s| {
            s.prefer_external_notifications = true;
            s.show_in_app_notification = false;
        });
        let report = f
            .dispatcher
            .dispatch(&DecodedNotification::progress("y"), &SessionToken::mint());
        assert_eq!(report.external, SinkOutcome::Delivered);
        assert_eq!(report.in_app, SinkOutcome::Disabled);
    }

    #[test]
    fn test_failing_external_does_not_block_in_app() {
        let f = fixture(
            FakeExternal {
                fail: true,
                ..Default::default()
            },
            FakeInApp::default(),
        );
        let report = f
            .dispatcher
            .dispatch(&DecodedNotification::progress("x"), &SessionToken::mint());
        assert_eq!(report.external, SinkOutcome::Failed);
        assert_eq!(report.in_app, SinkOutcome::Delivered);
        assert_eq!(f.in_app.shown.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_panicking_in_app_is_contained() {
        let f = fixture(
            FakeExternal::default(),
            FakeInApp {
                panic: true,
                ..Default::default()
            },
        );
        let report = f
            .dispatcher
            .dispatch(&DecodedNotification::progress("x"), &SessionToken::mint());
        assert_eq!(report.external, SinkOutcome::Delivered);
        assert_eq!(report.in_app, SinkOutcome::Failed);
    }

    #[test]
    fn test_in_app_selection_focuses_session() {
        let f = fixture(
            FakeExternal::default(),
            FakeInApp {
                select: true,
                ..Default::default()
            },
        );
        let session = SessionId::next();
        let token = f.registry.resolve_token(session);
        f.dispatcher
            .dispatch(&DecodedNotification::progress("x"), &token);
        assert_eq!(f.host.calls(), vec![format!("focus {}", session)]);
    }

    #[test]
    fn test_desktop_click_routes_to_focus() {
        let f = fixture(FakeExternal::default(), FakeInApp::default());
        let session = SessionId::next();
        let token = f.registry.resolve_token(session);
        assert!(f.external.clicks.fire(token.clone()));
        assert_eq!(f.host.calls(), vec![format!("focus {}", session)]);

        // A click for a session that has since closed falls back
        f.registry.remove(session);
        assert!(f.external.clicks.fire(token));
        assert_eq!(
            f.host.calls(),
            vec![format!("focus {}", session), "reveal".to_string()]
        );
    }

    #[test]
    fn test_second_dispatcher_keeps_first_click_handler() {
        let f = fixture(FakeExternal::default(), FakeInApp::default());
        let other_host = Arc::new(RecordingHost::default());
        let other_router = FocusRouter::new(Arc::clone(&f.registry), other_host.clone());
        let _second = Dispatcher::new(
            f.settings.clone(),
            f.external.clone(),
            f.in_app.clone(),
            other_router,
            "other",
        );
        let token = f.registry.resolve_token(SessionId::next());
        f.external.clicks.fire(token);
        assert_eq!(f.host.calls().len(), 1);
        assert!(other_host.calls().is_empty());
    }
}
