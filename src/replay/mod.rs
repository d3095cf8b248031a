//! In-page request replay.
//!
//! Replays captured requests with `fetch` from inside a dedicated page, so
//! every replay carries the session's cookies and origin exactly as the
//! original request did. DOM snapshots are taken in-page immediately before
//! and after each replay; the diff is computed here and reported as the
//! replay's observable page effect.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::backend::{Browser, Page};
use crate::commands::PageCommand;
use crate::config::SessionOptions;
use crate::error::{Error, Result};
use crate::executor::ScriptExecutor;
use crate::traffic::RequestSample;

// ============================================================================
// Types
// ============================================================================

/// Response half of a replayed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: FxHashMap<String, String>,
    /// Response body text.
    pub body: Option<String>,
}

/// Page-level effects observed across one replay.
///
/// Only fields that actually changed are present; an absent field means
/// "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageChanges {
    /// New document title, if it changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New URL, if it changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// New element count, if it changed.
    #[serde(
        rename = "elementCount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub element_count: Option<i64>,
}

impl PageChanges {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none() && self.element_count.is_none()
    }
}

/// Outcome of one replayed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayResult {
    /// Whether the in-page request completed.
    pub success: bool,
    /// The response, when the request completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ReplayResponse>,
    /// The in-page error message, when it did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Observed page effects; absent when nothing changed.
    #[serde(
        rename = "pageChanges",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub page_changes: Option<PageChanges>,
}

impl ReplayResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
            page_changes: None,
        }
    }
}

// ============================================================================
// RequestReplayer
// ============================================================================

/// Replays requests on a dedicated page within the authenticated context.
pub struct RequestReplayer {
    page: Arc<dyn Page>,
    executor: ScriptExecutor,
    options: SessionOptions,
    closed: AtomicBool,
}

impl fmt::Debug for RequestReplayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestReplayer")
            .field("page_id", &self.page.id())
            .finish_non_exhaustive()
    }
}

impl RequestReplayer {
    /// Opens a replay page and loads the site's base URL so replays run
    /// under the right origin.
    ///
    /// # Errors
    ///
    /// - [`Error::Navigation`] if the base URL fails to load
    pub async fn open(browser: Arc<dyn Browser>, options: SessionOptions) -> Result<Self> {
        let page = browser.open_page().await?;
        let base_url = options.site.base_url.to_string();
        if let Err(e) = page.navigate(&base_url).await {
            let _ = page.close().await;
            return Err(Error::navigation(format!(
                "replay page load of {base_url}: {e}"
            )));
        }
        sleep(options.settle_delay).await;

        let executor = ScriptExecutor::new(Arc::clone(&page), options.retry);
        debug!(page_id = %page.id(), url = %base_url, "Replay page ready");
        Ok(Self {
            page,
            executor,
            options,
            closed: AtomicBool::new(false),
        })
    }

    /// Closes the replay page. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page.close().await
    }

    /// Replays one request with in-page `fetch`.
    ///
    /// An in-page failure (network error, CORS rejection) is a successful
    /// call returning `success: false`; only evaluation failures surface as
    /// errors.
    ///
    /// # Errors
    ///
    /// - [`Error::Script`] if the replay script cannot be evaluated at all
    pub async fn replay(&self, sample: &RequestSample) -> Result<ReplayResult> {
        let value = self
            .executor
            .execute(&PageCommand::Fetch {
                sample: sample.clone(),
            })
            .await?;
        let result = parse_replay_value(&value);
        info!(
            url = %sample.url,
            method = %sample.method,
            success = result.success,
            status = result.response.as_ref().map_or(0, |r| r.status),
            "Request replayed"
        );
        Ok(result)
    }

    /// Replays a batch sequentially with the configured pacing delay.
    ///
    /// One result per sample, in order. A failed replay is recorded and the
    /// batch continues; evaluation failures are folded into failed results
    /// the same way.
    pub async fn replay_batch(&self, samples: &[RequestSample]) -> Vec<ReplayResult> {
        let mut results = Vec::with_capacity(samples.len());
        for (index, sample) in samples.iter().enumerate() {
            if index > 0 {
                sleep(self.options.replay_delay).await;
            }
            let result = match self.replay(sample).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(url = %sample.url, error = %e, "Replay evaluation failed, continuing batch");
                    ReplayResult::failed(e.to_string())
                }
            };
            results.push(result);
        }
        results
    }

    /// Replays through a page-global function instead of raw `fetch`.
    ///
    /// Useful when the application wraps its API calls in a function that
    /// attaches signatures or anti-forgery tokens `fetch` alone would miss.
    ///
    /// # Errors
    ///
    /// - [`Error::PageFunctionMissing`] if no such function is defined on
    ///   the page
    pub async fn replay_with_page_function(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<ReplayResult> {
        let value = self
            .executor
            .execute(&PageCommand::CallFunction {
                name: name.to_string(),
                args,
            })
            .await?;

        if value
            .get("missing")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Err(Error::page_function_missing(name));
        }
        Ok(parse_replay_value(&value))
    }

    /// Watches the replay page for effects over a window of time.
    ///
    /// Snapshots the page, waits `duration`, snapshots again and diffs.
    /// Useful after a replay whose effect lands asynchronously, outside
    /// the per-replay before/after window. Returns `None` when nothing
    /// changed.
    ///
    /// # Errors
    ///
    /// - [`Error::Script`] if a snapshot cannot be evaluated
    pub async fn observe_page_changes(&self, duration: Duration) -> Result<Option<PageChanges>> {
        let before = self.executor.execute(&PageCommand::Snapshot).await?;
        sleep(duration).await;
        let after = self.executor.execute(&PageCommand::Snapshot).await?;

        let changes = diff_snapshots(Some(&before), Some(&after));
        debug!(
            page_id = %self.page.id(),
            window_ms = duration.as_millis() as u64,
            changed = changes.is_some(),
            "Page-change window observed"
        );
        Ok(changes)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parses the in-page replay result.
fn parse_replay_value(value: &Value) -> ReplayResult {
    let success = value
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !success {
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown in-page failure");
        return ReplayResult::failed(error);
    }

    let response = value.get("response").map(|r| ReplayResponse {
        status: r
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(0),
        headers: r
            .get("headers")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default(),
        body: r.get("body").and_then(Value::as_str).map(str::to_string),
    });

    ReplayResult {
        success: true,
        response,
        error: None,
        page_changes: diff_snapshots(value.get("before"), value.get("after")),
    }
}

/// Diffs the before/after snapshots into changed-only page effects.
fn diff_snapshots(before: Option<&Value>, after: Option<&Value>) -> Option<PageChanges> {
    let (before, after) = (before?, after?);

    let changed_str = |key: &str| {
        let b = before.get(key).and_then(Value::as_str);
        let a = after.get(key).and_then(Value::as_str);
        if a != b { a.map(str::to_string) } else { None }
    };

    let count = |v: &Value| v.get("elementCount").and_then(Value::as_i64);
    let element_count = match (count(before), count(after)) {
        (Some(b), Some(a)) if a != b => Some(a),
        _ => None,
    };

    let changes = PageChanges {
        title: changed_str("title"),
        url: changed_str("url"),
        element_count,
    };
    if changes.is_empty() { None } else { Some(changes) }
}

// ============================================================================
// Tests
// ============================================================================
