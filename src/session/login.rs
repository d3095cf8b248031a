//! Login-wait protocol and target-page assurance.
//!
//! The login wait is a single-flight state machine: idle -> waiting ->
//! resolved. The first caller installs a watch channel and spawns the poll
//! task; concurrent callers subscribe to the same channel instead of
//! starting a duplicate poll. Resolution is sent exactly once. Each caller races its
//! own timeout against the shared resolution, so a short timeout fails fast
//! regardless of the poll interval. When the last waiter gives up the poll
//! task stops and the state returns to idle; a later call restarts the
//! whole protocol.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::core::{LoginStatus, Session, SessionInner};
use super::state::PageState;

// ============================================================================
// LoginWait
// ============================================================================

/// Single-flight login-wait state.
///
/// `Some` sender means a wait is in flight; `None` means idle. The slot
/// holds the sender side so the poll task can observe "all waiters gone"
/// through the receiver count.
pub(crate) struct LoginWait {
    slot: Mutex<Option<watch::Sender<Option<LoginStatus>>>>,
}

impl LoginWait {
    /// Creates the idle state.
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns `true` while a wait is in flight.
    pub(crate) fn is_waiting(&self) -> bool {
        self.slot.lock().is_some()
    }
}

// ============================================================================
// Session - Login Wait
// ============================================================================

impl Session {
    /// Returns `true` while a login wait is in flight.
    #[inline]
    #[must_use]
    pub fn is_waiting_for_login(&self) -> bool {
        self.inner.login_wait.is_waiting()
    }

    /// Waits for a human to complete login, up to `wait_timeout`.
    ///
    /// Shows the session window, then polls the login probe at the
    /// configured interval until it reports logged-in. Concurrent callers
    /// observe the same pending resolution rather than starting a duplicate
    /// poll.
    ///
    /// # Errors
    ///
    /// - [`Error::LoginTimeout`] if login is not detected in time; the
    ///   session stays usable and a later call may retry
    pub async fn wait_for_login(&self, wait_timeout: Duration) -> Result<LoginStatus> {
        let rx = self.join_or_start_wait();
        self.show_window();

        let resolved = timeout(wait_timeout, Self::await_resolution(rx)).await;
        match resolved {
            Ok(result) => result,
            Err(_) => {
                debug!(session = %self.inner.uuid, timeout_ms = wait_timeout.as_millis() as u64, "Login wait timed out");
                Err(Error::login_timeout(wait_timeout.as_millis() as u64))
            }
        }
    }

    /// Joins the in-flight wait or starts a new poll task.
    fn join_or_start_wait(&self) -> watch::Receiver<Option<LoginStatus>> {
        let mut slot = self.inner.login_wait.slot.lock();
        if let Some(tx) = slot.as_ref() {
            debug!(session = %self.inner.uuid, "Joining in-flight login wait");
            return tx.subscribe();
        }

        let (tx, rx) = watch::channel(None);
        *slot = Some(tx.clone());
        debug!(session = %self.inner.uuid, "Starting login poll");
        tokio::spawn(Self::poll_login(Arc::clone(&self.inner), tx));
        rx
    }

    /// Blocks until the shared wait resolves.
    async fn await_resolution(
        mut rx: watch::Receiver<Option<LoginStatus>>,
    ) -> Result<LoginStatus> {
        let resolved = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::PageClosed)?
            .clone();
        resolved.ok_or(Error::PageClosed)
    }

    /// The poll task: re-evaluates the login probe until it reports
    /// logged-in or every waiter has given up.
    async fn poll_login(inner: Arc<SessionInner>, tx: watch::Sender<Option<LoginStatus>>) {
        let interval = inner.options.login_poll_interval;
        let session = Session {
            inner: Arc::clone(&inner),
        };

        loop {
            match session.check_login_status().await {
                Ok(status) if status.is_logged_in => {
                    info!(
                        session = %inner.uuid,
                        username = status.username.as_deref().unwrap_or(""),
                        "Login detected"
                    );
                    // Single resolution; ignore the error if every waiter
                    // already timed out.
                    let _ = tx.send(Some(status));
                    *inner.login_wait.slot.lock() = None;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(session = %inner.uuid, error = %e, "Login probe failed, will poll again");
                }
            }

            tokio::select! {
                () = sleep(interval) => {}
                () = tx.closed() => {
                    // Joiners subscribe under the slot lock, so the empty
                    // check and the slot clear must happen under that same
                    // lock. Otherwise a joiner could subscribe to a sender
                    // this task is about to abandon and hang on a channel
                    // nobody polls.
                    let mut slot = inner.login_wait.slot.lock();
                    if tx.receiver_count() > 0 {
                        continue;
                    }
                    *slot = None;
                    debug!(session = %inner.uuid, "All login waiters gone, stopping poll");
                    return;
                }
            }
        }
    }
}

// ============================================================================
// Session - Target Page
// ============================================================================

impl Session {
    /// Ensures the session page shows the application's target (home) page.
    ///
    /// Already home: returns immediately. A challenge or risk-control page:
    /// shows the window and fails, since a human must clear it first. Not
    /// logged in: runs the login-wait protocol before navigating. After any
    /// navigation the home DOM markers are re-verified following a settle
    /// delay; absence is a failure, not a retry.
    ///
    /// # Errors
    ///
    /// - [`Error::Navigation`] if home markers are absent after navigation
    ///   or a challenge blocks the page
    /// - [`Error::LoginTimeout`] if the human never completes login
    pub async fn ensure_on_target_page(&self) -> Result<bool> {
        let state = self.current_state().await?;
        debug!(session = %self.inner.uuid, %state, "Ensuring target page");

        match state {
            PageState::Home => return Ok(true),
            PageState::Captcha | PageState::RiskControl => {
                self.show_window();
                return Err(Error::navigation(format!(
                    "page blocked by {state}, human intervention required"
                )));
            }
            PageState::Login => {
                self.wait_for_login(self.inner.options.login_timeout).await?;
            }
            PageState::Unknown => {
                let status = self.check_login_status().await?;
                if !status.is_logged_in {
                    self.wait_for_login(self.inner.options.login_timeout).await?;
                }
            }
        }

        let base_url = self.inner.options.site.base_url.to_string();
        self.inner
            .page
            .navigate(&base_url)
            .await
            .map_err(|e| Error::navigation(format!("navigate to {base_url}: {e}")))?;

        sleep(self.inner.options.settle_delay).await;

        // Classification is re-run from scratch after the settle delay.
        let url = self.inner.page.current_url().await?;
        let probes = self.gather_probes().await?;
        let state = super::state::classify(&url, &probes, &self.inner.options.site);
        if state != PageState::Home {
            return Err(Error::navigation(format!(
                "home markers absent after navigation, page classified as {state}"
            )));
        }

        info!(session = %self.inner.uuid, "Target page verified");
        Ok(true)
    }
}

// ============================================================================
// Tests
// ============================================================================
