//! Core Session struct and lifecycle.
//!
//! [`Session`] is the single source of truth for "is there a usable,
//! authenticated page right now". It exclusively owns the live session
//! page; the observer and replayer spawn their own pages from the same
//! browsing context and never touch this one.
//!
//! # Example
//!
//! ```ignore
//! use session_pilot::{Session, SessionOptions};
//!
//! # async fn example(browser: std::sync::Arc<dyn session_pilot::Browser>) -> session_pilot::Result<()> {
//! let options = SessionOptions::new("https://example.com")?;
//! let session = Session::open(browser, options).await?;
//!
//! session.ensure_on_target_page().await?;
//! let status = session.check_login_status().await?;
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Browser, NavigationKind, Page, PageEvent};
use crate::commands::PageCommand;
use crate::config::SessionOptions;
use crate::error::{Error, Result};
use crate::executor::ScriptExecutor;

use super::captcha::CaptchaHandler;
use super::login::LoginWait;
use super::state::{DomProbes, PageState, classify};

// ============================================================================
// Types
// ============================================================================

/// One navigation observed on the session page.
///
/// Appended on every navigation; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    /// URL after the navigation.
    pub url: String,
    /// Document title at the time of the event.
    pub title: String,
    /// When the event was observed.
    pub timestamp: DateTime<Utc>,
    /// Top-level or in-page.
    pub kind: NavigationKind,
}

/// Login state derived from in-page markers.
///
/// Recomputed on demand; never trusted longer than one check cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStatus {
    /// Whether a logged-in user was detected.
    pub is_logged_in: bool,
    /// Detected username, if any.
    pub username: Option<String>,
    /// Detected avatar URL, if any.
    pub avatar: Option<String>,
    /// When the status was computed.
    pub last_checked_at: DateTime<Utc>,
}

impl LoginStatus {
    /// A logged-out status checked now.
    #[must_use]
    pub fn logged_out() -> Self {
        Self {
            is_logged_in: false,
            username: None,
            avatar: None,
            last_checked_at: Utc::now(),
        }
    }
}

/// Internal shared state for a session.
pub(crate) struct SessionInner {
    /// Unique identifier for this session.
    pub(crate) uuid: Uuid,
    /// The browsing context pages are spawned from.
    pub(crate) browser: Arc<dyn Browser>,
    /// The live session page.
    pub(crate) page: Arc<dyn Page>,
    /// Executor bound to the session page.
    pub(crate) executor: ScriptExecutor,
    /// Injected options.
    pub(crate) options: SessionOptions,
    /// Bounded navigation history, oldest evicted first.
    history: Mutex<VecDeque<NavigationEvent>>,
    /// Last computed login status.
    login_status: Mutex<LoginStatus>,
    /// Single-flight login-wait state.
    pub(crate) login_wait: LoginWait,
    /// Challenge handler bound to the session page.
    captcha: CaptchaHandler,
    /// Set once `close` has run.
    closed: AtomicBool,
    /// Event watcher task handle.
    watcher: Mutex<Option<JoinHandle<()>>>,
}

// ============================================================================
// Session
// ============================================================================

/// A handle to the live authenticated browsing session.
///
/// Cloning is cheap; all clones share the same session.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("uuid", &self.inner.uuid)
            .field("page_id", &self.inner.page.id())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl Session {
    /// Opens a session: spawns the session page, navigates to the site's
    /// base URL and starts watching navigation events.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Navigation`] if the initial load fails
    pub async fn open(browser: Arc<dyn Browser>, options: SessionOptions) -> Result<Self> {
        options.validate()?;

        let page = browser.open_page().await?;
        let events = page.subscribe();
        let executor = ScriptExecutor::new(Arc::clone(&page), options.retry);
        let captcha = CaptchaHandler::new(executor.clone(), options.captcha_timeout);
        let uuid = Uuid::new_v4();

        let base_url = options.site.base_url.to_string();
        if let Err(e) = page.navigate(&base_url).await {
            let _ = page.close().await;
            return Err(Error::navigation(format!(
                "initial load of {base_url}: {e}"
            )));
        }

        let inner = Arc::new(SessionInner {
            uuid,
            browser,
            page,
            executor,
            options,
            history: Mutex::new(VecDeque::new()),
            login_status: Mutex::new(LoginStatus::logged_out()),
            login_wait: LoginWait::new(),
            captcha,
            closed: AtomicBool::new(false),
            watcher: Mutex::new(None),
        });

        let watcher = tokio::spawn(Self::watch_events(Arc::clone(&inner), events));
        *inner.watcher.lock() = Some(watcher);

        info!(session = %uuid, url = %base_url, "Session opened");
        Ok(Self { inner })
    }

    /// Closes the session page and stops the event watcher.
    ///
    /// Idempotent; later calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(handle) = self.inner.watcher.lock().take() {
            handle.abort();
        }
        self.inner.page.close().await?;
        info!(session = %self.inner.uuid, "Session closed");
        Ok(())
    }

    /// Returns `true` once `close` has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Session - Event Watcher
// ============================================================================

impl Session {
    /// Drains the session page's event queue.
    ///
    /// Appends navigation events to the bounded history and surfaces the
    /// window when navigation lands on a page that needs a human.
    async fn watch_events(inner: Arc<SessionInner>, mut events: mpsc::Receiver<PageEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                PageEvent::Navigated { url, title, kind } => {
                    debug!(session = %inner.uuid, url = %url, ?kind, "Navigation observed");
                    Self::record_navigation(&inner, url.clone(), title, kind);

                    let state = classify(&url, &DomProbes::default(), &inner.options.site);
                    if state.needs_human() {
                        warn!(session = %inner.uuid, url = %url, %state, "Page needs human attention, showing window");
                        inner.page.show();
                    }
                }
                PageEvent::Closed => {
                    warn!(session = %inner.uuid, "Session page closed by backend");
                    break;
                }
                // Request traffic on the session page is not recorded; bulk
                // capture happens on dedicated observer pages.
                PageEvent::RequestSent { .. } | PageEvent::RequestCompleted { .. } => {}
            }
        }
    }

    /// Appends a navigation event, evicting the oldest past the cap.
    fn record_navigation(inner: &SessionInner, url: String, title: String, kind: NavigationKind) {
        let mut history = inner.history.lock();
        while history.len() >= inner.options.history_cap {
            history.pop_front();
        }
        history.push_back(NavigationEvent {
            url,
            title,
            timestamp: Utc::now(),
            kind,
        });
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the session's unique ID.
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> &Uuid {
        &self.inner.uuid
    }

    /// Returns the injected options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Returns the browsing context for spawning observer/replay pages.
    #[inline]
    #[must_use]
    pub fn browser(&self) -> &Arc<dyn Browser> {
        &self.inner.browser
    }

    /// Returns the executor bound to the session page.
    #[inline]
    #[must_use]
    pub fn executor(&self) -> &ScriptExecutor {
        &self.inner.executor
    }

    /// Returns the challenge handler bound to the session page.
    #[inline]
    #[must_use]
    pub fn captcha(&self) -> &CaptchaHandler {
        &self.inner.captcha
    }

    /// Returns a copy of the navigation history, oldest first.
    #[must_use]
    pub fn navigation_history(&self) -> Vec<NavigationEvent> {
        self.inner.history.lock().iter().cloned().collect()
    }

    /// Returns the last computed login status without re-probing.
    #[must_use]
    pub fn login_status(&self) -> LoginStatus {
        self.inner.login_status.lock().clone()
    }
}

// ============================================================================
// Session - Window Visibility
// ============================================================================

impl Session {
    /// Shows and focuses the session window.
    ///
    /// Used whenever human intervention is required.
    pub fn show_window(&self) {
        debug!(session = %self.inner.uuid, "Showing session window");
        self.inner.page.show();
    }

    /// Hides the session window.
    pub fn hide_window(&self) {
        debug!(session = %self.inner.uuid, "Hiding session window");
        self.inner.page.hide();
    }
}

// ============================================================================
// Session - Scripts & Probes
// ============================================================================

impl Session {
    /// Executes a structured command on the session page with retries.
    pub async fn execute(&self, command: &PageCommand) -> Result<Value> {
        self.inner.executor.execute(command).await
    }

    /// Executes a caller-supplied self-contained script with retries.
    ///
    /// The script must return a JSON-serializable value or throw. Scripts
    /// with side effects may be duplicated on retry; see
    /// [`PageCommand::is_effectful`].
    pub async fn execute_script(&self, script: &str) -> Result<Value> {
        self.execute(&PageCommand::Eval {
            script: script.to_string(),
        })
        .await
    }

    /// Recomputes the login status by probing the live DOM.
    pub async fn check_login_status(&self) -> Result<LoginStatus> {
        let site = &self.inner.options.site;
        let value = self
            .execute(&PageCommand::LoginProbe {
                username_selectors: site.username_selectors.clone(),
                avatar_selectors: site.avatar_selectors.clone(),
            })
            .await?;

        let status = parse_login_status(&value);
        debug!(
            session = %self.inner.uuid,
            is_logged_in = status.is_logged_in,
            username = status.username.as_deref().unwrap_or(""),
            "Login status checked"
        );
        *self.inner.login_status.lock() = status.clone();
        Ok(status)
    }

    /// Classifies the page currently shown.
    ///
    /// Probes are gathered fresh on every call; nothing is cached across
    /// the await.
    pub async fn current_state(&self) -> Result<PageState> {
        let url = self.inner.page.current_url().await?;
        let probes = self.gather_probes().await?;
        Ok(classify(&url, &probes, &self.inner.options.site))
    }

    /// Gathers the DOM probe results classification consumes.
    pub(crate) async fn gather_probes(&self) -> Result<DomProbes> {
        let site = &self.inner.options.site;

        let home_marker = self
            .execute(&PageCommand::SelectorExists {
                selector: site.home_selector.clone(),
            })
            .await?
            .as_bool()
            .unwrap_or(false);

        let captcha_marker = self.inner.captcha.detect().await?.is_some();

        Ok(DomProbes {
            home_marker,
            captcha_marker,
            risk_marker: false,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parses the login-probe result into a status.
fn parse_login_status(value: &Value) -> LoginStatus {
    let non_empty = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    LoginStatus {
        is_logged_in: value
            .get("isLoggedIn")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        username: value.get("username").and_then(|v| non_empty(v)),
        avatar: value.get("avatar").and_then(|v| non_empty(v)),
        last_checked_at: Utc::now(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::testing::{FakeBrowser, FakePage};

    async fn open_session(page: Arc<FakePage>) -> Session {
        let browser = FakeBrowser::with_pages(vec![page]);
        let options = SessionOptions::new("https://example.com").unwrap();
        Session::open(browser, options).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_navigates_to_base_url() {
        let page = FakePage::new("https://example.com/");
        let session = open_session(Arc::clone(&page)).await;
        assert_eq!(page.navigations(), vec!["https://example.com/"]);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let page = FakePage::new("https://example.com/");
        let session = open_session(page).await;
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let page = FakePage::new("https://example.com/");
        let browser = FakeBrowser::with_pages(vec![Arc::clone(&page)]);
        let options = SessionOptions::new("https://example.com")
            .unwrap()
            .with_history_cap(3);
        let session = Session::open(browser, options).await.unwrap();

        for i in 0..5 {
            page.emit(PageEvent::Navigated {
                url: format!("https://example.com/p/{i}"),
                title: format!("page {i}"),
                kind: NavigationKind::TopLevel,
            });
        }
        // Let the watcher drain the queue.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let history = session.navigation_history();
        assert_eq!(history.len(), 3);
        // Oldest entries were evicted.
        assert_eq!(history[0].url, "https://example.com/p/2");
        assert_eq!(history[2].url, "https://example.com/p/4");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_navigation_to_login_shows_window() {
        let page = FakePage::new("https://example.com/");
        let session = open_session(Arc::clone(&page)).await;

        page.emit(PageEvent::Navigated {
            url: "https://example.com/login".to_string(),
            title: "Sign in".to_string(),
            kind: NavigationKind::TopLevel,
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(page.show_count() >= 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_login_status_parses_probe() {
        let page = FakePage::new("https://example.com/");
        let session = open_session(Arc::clone(&page)).await;

        page.push_script_result(Ok(json!({
            "isLoggedIn": true,
            "username": " alice ",
            "avatar": "https://cdn.example.com/a.png"
        })));

        let status = session.check_login_status().await.unwrap();
        assert!(status.is_logged_in);
        assert_eq!(status.username.as_deref(), Some("alice"));
        assert_eq!(session.login_status().username.as_deref(), Some("alice"));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_current_state_home() {
        let page = FakePage::new("https://example.com/");
        let session = open_session(Arc::clone(&page)).await;

        // Home selector probe, then captcha probe.
        page.push_script_result(Ok(Value::from(true)));
        page.push_script_result(Ok(Value::Null));

        assert_eq!(session.current_state().await.unwrap(), PageState::Home);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_current_state_unknown_without_marker() {
        let page = FakePage::new("https://example.com/");
        let session = open_session(Arc::clone(&page)).await;

        page.push_script_result(Ok(Value::from(false)));
        page.push_script_result(Ok(Value::Null));

        assert_eq!(session.current_state().await.unwrap(), PageState::Unknown);
        session.close().await.unwrap();
    }

    #[test]
    fn test_parse_login_status_defaults() {
        let status = parse_login_status(&json!({}));
        assert!(!status.is_logged_in);
        assert!(status.username.is_none());
    }
}
