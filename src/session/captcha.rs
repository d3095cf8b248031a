//! Challenge detection and manual resolution.
//!
//! Detection is a read-only DOM probe; this crate never attempts to solve a
//! challenge. When one is found, [`CaptchaHandler::handle`] surfaces the
//! window and blocks until a human (via [`CaptchaHandler::resolve`] or
//! [`CaptchaHandler::skip`]) or the timeout settles it. At most one
//! challenge is handled at a time per session.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use crate::commands::{CaptchaSelectors, PageCommand};
use crate::error::{Error, Result};
use crate::executor::ScriptExecutor;

// ============================================================================
// Types
// ============================================================================

/// Challenge kind, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptchaKind {
    /// Image-recognition captcha.
    Image,
    /// Slider / drag captcha.
    Slider,
    /// SMS verification code.
    Sms,
    /// Email verification code.
    Email,
    /// A challenge marker matched but the kind is unrecognized.
    Unknown,
}

impl CaptchaKind {
    /// Returns the kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Slider => "slider",
            Self::Sms => "sms",
            Self::Email => "email",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a kind name; anything unrecognized is [`CaptchaKind::Unknown`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "image" => Self::Image,
            "slider" => Self::Slider,
            "sms" => Self::Sms,
            "email" => Self::Email,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for CaptchaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaInfo {
    /// Detected kind.
    pub kind: CaptchaKind,
    /// What matched, shown to the human alongside the prompt.
    pub message: String,
    /// When the challenge was detected.
    pub detected_at: DateTime<Utc>,
}

/// Outcome of a handled challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptchaResult {
    /// The challenge was confirmed solved by the human.
    pub solved: bool,
    /// Time spent waiting.
    pub elapsed: Duration,
}

/// Manual signal delivered by `resolve` or `skip`.
enum ManualSignal {
    Resolved,
    Skipped,
}

// ============================================================================
// CaptchaHandler
// ============================================================================

struct HandlerInner {
    /// Executor bound to the session page.
    executor: ScriptExecutor,
    /// How long `handle` waits for the human.
    wait_timeout: Duration,
    /// Per-kind detection selectors.
    selectors: CaptchaSelectors,
    /// `Some` while a challenge wait is pending; holds the channel the
    /// manual surface fires.
    pending: Mutex<Option<oneshot::Sender<ManualSignal>>>,
}

/// Detects challenges and waits for a human to clear them.
///
/// Cloning is cheap; all clones share the same pending-challenge state.
#[derive(Clone)]
pub struct CaptchaHandler {
    inner: Arc<HandlerInner>,
}

impl fmt::Debug for CaptchaHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptchaHandler")
            .field("handling", &self.is_handling())
            .finish_non_exhaustive()
    }
}

impl CaptchaHandler {
    /// Creates a handler bound to a page's executor.
    #[must_use]
    pub fn new(executor: ScriptExecutor, wait_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                executor,
                wait_timeout,
                selectors: CaptchaSelectors::default(),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Returns `true` while a challenge wait is pending.
    #[must_use]
    pub fn is_handling(&self) -> bool {
        self.inner.pending.lock().is_some()
    }

    /// Probes the page for a challenge.
    ///
    /// A single read-only evaluation; selectors are checked in priority
    /// order and the first match wins.
    pub async fn detect(&self) -> Result<Option<CaptchaInfo>> {
        let value = self
            .inner
            .executor
            .execute_once(&PageCommand::DetectCaptcha {
                selectors: self.inner.selectors.clone(),
            })
            .await?;
        Ok(parse_detection(&value))
    }

    /// Waits for a human to clear a detected challenge.
    ///
    /// Surfaces the window, then blocks until [`CaptchaHandler::resolve`],
    /// [`CaptchaHandler::skip`] or the configured timeout. The pending
    /// state is cleared on every exit path.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyHandling`] if a wait is already pending
    /// - [`Error::CaptchaSkipped`] if the human skipped the challenge
    /// - [`Error::CaptchaTimeout`] if nobody settled it in time
    pub async fn handle(&self, info: &CaptchaInfo) -> Result<CaptchaResult> {
        let rx = {
            let mut pending = self.inner.pending.lock();
            if pending.is_some() {
                return Err(Error::AlreadyHandling);
            }
            let (tx, rx) = oneshot::channel();
            *pending = Some(tx);
            rx
        };

        info!(kind = %info.kind, message = %info.message, "Challenge detected, waiting for human");
        self.inner.executor.page().show();

        let started = Instant::now();
        let outcome = timeout(self.inner.wait_timeout, rx).await;
        *self.inner.pending.lock() = None;

        let elapsed = started.elapsed();
        match outcome {
            Ok(Ok(ManualSignal::Resolved)) => {
                info!(kind = %info.kind, elapsed_ms = elapsed.as_millis() as u64, "Challenge resolved");
                Ok(CaptchaResult {
                    solved: true,
                    elapsed,
                })
            }
            // A dropped sender without a signal counts as a skip.
            Ok(Ok(ManualSignal::Skipped)) | Ok(Err(_)) => {
                warn!(kind = %info.kind, "Challenge skipped");
                Err(Error::CaptchaSkipped)
            }
            Err(_) => {
                warn!(kind = %info.kind, timeout_ms = self.inner.wait_timeout.as_millis() as u64, "Challenge wait timed out");
                Err(Error::captcha_timeout(
                    self.inner.wait_timeout.as_millis() as u64
                ))
            }
        }
    }

    /// Detects and, if a challenge is present, handles it.
    ///
    /// Returns `Ok(None)` when the page is clean.
    pub async fn auto_handle(&self) -> Result<Option<CaptchaResult>> {
        match self.detect().await? {
            Some(info) => Ok(Some(self.handle(&info).await?)),
            None => Ok(None),
        }
    }

    /// Marks the pending challenge as solved.
    ///
    /// Returns `false` if no wait was pending.
    pub fn resolve(&self) -> bool {
        self.signal(ManualSignal::Resolved)
    }

    /// Skips the pending challenge; the waiting `handle` call fails with
    /// [`Error::CaptchaSkipped`].
    ///
    /// Returns `false` if no wait was pending.
    pub fn skip(&self) -> bool {
        self.signal(ManualSignal::Skipped)
    }

    fn signal(&self, signal: ManualSignal) -> bool {
        match self.inner.pending.lock().take() {
            Some(tx) => tx.send(signal).is_ok(),
            None => {
                debug!("Manual challenge signal with no pending wait");
                false
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parses the detection probe result.
fn parse_detection(value: &Value) -> Option<CaptchaInfo> {
    if value.is_null() {
        return None;
    }
    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .map(CaptchaKind::parse)?;
    let message = value
        .get("selector")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(CaptchaInfo {
        kind,
        message,
        detected_at: Utc::now(),
    })
}

// ============================================================================
// Tests
// ============================================================================
