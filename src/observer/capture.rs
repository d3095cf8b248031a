//! Dedicated-page traffic capture.
//!
//! [`RequestObserver`] spawns its own short-lived page from the shared
//! browsing context, so capture inherits the session's authentication
//! without ever touching the live session page. The event subscription is
//! taken before navigation starts; the initial page load's traffic is part
//! of the capture.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::backend::{Browser, Page, PageEvent};
use crate::config::SessionOptions;
use crate::error::Result;
use crate::executor::ScriptExecutor;
use crate::traffic::{RequestLog, ResponseInfo};

use super::actions::Action;
use super::har;

// ============================================================================
// Types
// ============================================================================

/// The result of one observation run.
#[derive(Debug)]
pub struct Observation {
    /// The URL that was observed.
    pub url: String,
    /// Captured requests in capture order; requests whose completion never
    /// arrived have no response.
    pub requests: Vec<RequestLog>,
    /// Path of the written exchange-log artifact.
    pub har_path: PathBuf,
}

/// Shared state between the driver and the event collector.
struct CaptureState {
    requests: Mutex<Vec<RequestLog>>,
    last_activity: Mutex<Instant>,
}

impl CaptureState {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn quiet_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    fn take(&self) -> Vec<RequestLog> {
        std::mem::take(&mut *self.requests.lock())
    }
}

// ============================================================================
// RequestObserver
// ============================================================================

/// Captures the request traffic a page interaction produces.
pub struct RequestObserver {
    browser: Arc<dyn Browser>,
    options: SessionOptions,
}

impl RequestObserver {
    /// Creates an observer over a browsing context.
    #[must_use]
    pub fn new(browser: Arc<dyn Browser>, options: SessionOptions) -> Self {
        Self { browser, options }
    }

    /// Observes a URL: loads it on a fresh page, waits for the load's
    /// traffic to go quiet, runs the scripted actions in order, settles,
    /// then writes the capture as an exchange-log artifact.
    ///
    /// The page is closed on every exit path, including action failures.
    ///
    /// # Errors
    ///
    /// - [`Error::Script`](crate::Error::Script) if an action exhausts its
    ///   retries; earlier captures are discarded with the page
    /// - [`Error::Io`](crate::Error::Io) if the artifact cannot be written
    pub async fn observe(&self, url: &str, actions: &[Action]) -> Result<Observation> {
        let page = self.browser.open_page().await?;
        // Subscribe before navigating so the initial load's traffic is
        // part of the capture.
        let events = page.subscribe();
        let state = Arc::new(CaptureState::new());
        let collector = tokio::spawn(Self::collect(events, Arc::clone(&state)));

        let driven = self.drive(&page, url, actions, &state).await;

        collector.abort();
        let closed = page.close().await;
        driven?;
        closed?;

        let requests = state.take();
        let har_path = har::write_har(&self.options.data_dir, &requests).await?;
        info!(url, captured = requests.len(), "Observation complete");

        Ok(Observation {
            url: url.to_string(),
            requests,
            har_path,
        })
    }

    /// Navigates, runs actions, waits out the network.
    async fn drive(
        &self,
        page: &Arc<dyn Page>,
        url: &str,
        actions: &[Action],
        state: &CaptureState,
    ) -> Result<()> {
        page.navigate(url).await?;
        self.wait_for_network_idle(state).await;

        let executor = ScriptExecutor::new(Arc::clone(page), self.options.retry);
        for action in actions {
            if let Action::Wait { duration_ms } = action {
                sleep(Duration::from_millis(*duration_ms)).await;
                continue;
            }
            if let Some(command) = action.to_command() {
                debug!(page_id = %page.id(), command = command.name(), "Running observed action");
                executor.execute(&command).await?;
            }
            sleep(self.options.behavior.min_delay).await;
        }

        sleep(self.options.observer_settle).await;
        Ok(())
    }

    /// Waits until no traffic has arrived for the idle threshold, bounded
    /// by the idle timeout.
    async fn wait_for_network_idle(&self, state: &CaptureState) {
        let deadline = Instant::now() + self.options.network_idle_timeout;
        loop {
            let quiet = state.quiet_for();
            if quiet >= self.options.network_idle_threshold {
                return;
            }
            if Instant::now() >= deadline {
                warn!("Network never went idle within the timeout, proceeding");
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// Drains page events into the capture, pairing completions with their
    /// requests by correlation ID.
    async fn collect(mut events: mpsc::Receiver<PageEvent>, state: Arc<CaptureState>) {
        while let Some(event) = events.recv().await {
            match event {
                PageEvent::RequestSent {
                    id,
                    url,
                    method,
                    headers,
                    body,
                } => {
                    state.touch();
                    state.requests.lock().push(RequestLog {
                        id,
                        url,
                        method,
                        headers,
                        body,
                        timestamp: Utc::now(),
                        response: None,
                    });
                }
                PageEvent::RequestCompleted {
                    id,
                    status,
                    headers,
                    body,
                } => {
                    state.touch();
                    let mut requests = state.requests.lock();
                    // Scan newest-first; IDs repeat only across page lifetimes.
                    match requests.iter_mut().rev().find(|r| r.id == id) {
                        Some(log) => {
                            log.response = Some(ResponseInfo {
                                status,
                                headers,
                                body,
                            });
                        }
                        None => debug!(%id, "Completion for an unseen request, dropping"),
                    }
                }
                PageEvent::Navigated { .. } => state.touch(),
                PageEvent::Closed => break,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashMap;

    use crate::identifiers::CaptureId;
    use crate::testing::{FakeBrowser, FakePage};

    fn sent(id: u64, url: &str) -> PageEvent {
        PageEvent::RequestSent {
            id: CaptureId::new(id),
            url: url.to_string(),
            method: "GET".to_string(),
            headers: FxHashMap::default(),
            body: None,
        }
    }

    fn completed(id: u64, status: u16) -> PageEvent {
        PageEvent::RequestCompleted {
            id: CaptureId::new(id),
            status,
            headers: FxHashMap::default(),
            body: Some("{}".to_string()),
        }
    }

    fn observer(page: Arc<FakePage>, data_dir: &std::path::Path) -> RequestObserver {
        crate::testing::init_logging();
        let options = SessionOptions::new("https://example.com")
            .unwrap()
            .with_data_dir(data_dir);
        RequestObserver::new(FakeBrowser::with_pages(vec![page]), options)
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_pairs_responses_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new("about:blank");
        page.queue_event(sent(1, "https://example.com/api/feed"));
        page.queue_event(completed(1, 200));
        page.queue_event(sent(2, "https://example.com/api/slow"));

        let observation = observer(Arc::clone(&page), dir.path())
            .observe("https://example.com/feed", &[])
            .await
            .unwrap();

        assert_eq!(observation.requests.len(), 2);
        assert_eq!(
            observation.requests[0].response.as_ref().unwrap().status,
            200
        );
        // The unfinished request is kept, without a response.
        assert!(observation.requests[1].response.is_none());
        assert!(observation.har_path.exists());
        assert!(page.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new("about:blank");
        page.push_script_result(Ok(serde_json::Value::from(true)));
        page.push_script_result(Ok(serde_json::Value::from(true)));

        observer(Arc::clone(&page), dir.path())
            .observe(
                "https://example.com/feed",
                &[
                    Action::Click {
                        selector: ".load-more".to_string(),
                    },
                    Action::Wait { duration_ms: 200 },
                    Action::Scroll { pixels: 600 },
                ],
            )
            .await
            .unwrap();

        let scripts = page.evaluated_scripts();
        assert_eq!(scripts.len(), 2);
        assert!(scripts[0].contains("click"));
        assert!(scripts[1].contains("scrollBy"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_paced_at_fixed_min_delay() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new("about:blank");
        page.push_script_result(Ok(serde_json::Value::from(true)));
        page.push_script_result(Ok(serde_json::Value::from(true)));

        let mut options = SessionOptions::new("https://example.com")
            .unwrap()
            .with_data_dir(dir.path());
        options.behavior.min_delay = Duration::from_millis(300);
        options.behavior.max_delay = Duration::from_millis(900);
        let observer = RequestObserver::new(FakeBrowser::with_pages(vec![Arc::clone(&page)]), options);

        let start = Instant::now();
        observer
            .observe(
                "https://example.com/feed",
                &[
                    Action::Click {
                        selector: ".a".to_string(),
                    },
                    Action::Click {
                        selector: ".b".to_string(),
                    },
                ],
            )
            .await
            .unwrap();

        // Idle wait (500ms) + two fixed 300ms pacing delays + the 2s
        // settle. Pacing is deterministic: min_delay, never a value drawn
        // from the [min, max] range.
        assert_eq!(
            start.elapsed(),
            Duration::from_millis(500 + 300 + 300 + 2000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_action_closes_page() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new("about:blank");
        for _ in 0..3 {
            page.push_script_result(Err("element vanished".to_string()));
        }

        let err = observer(Arc::clone(&page), dir.path())
            .observe(
                "https://example.com/feed",
                &[Action::Click {
                    selector: ".gone".to_string(),
                }],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, crate::Error::Script { .. }));
        assert!(page.is_closed());
        // No artifact is written for an aborted run.
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_capture_still_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new("about:blank");

        let observation = observer(Arc::clone(&page), dir.path())
            .observe("https://example.com/quiet", &[])
            .await
            .unwrap();

        assert!(observation.requests.is_empty());
        assert!(observation.har_path.exists());
    }
}
