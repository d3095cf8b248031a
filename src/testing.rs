//! In-memory fakes for the backend seam.
//!
//! [`FakePage`] scripts evaluation results through a FIFO queue and records
//! everything the code under test does to it; [`FakeBrowser`] hands out
//! pre-built pages. Both live behind `cfg(test)`.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::backend::{Browser, EVENT_QUEUE_CAPACITY, Page, PageEvent};
use crate::error::{Error, Result};
use crate::identifiers::PageId;

static NEXT_PAGE_ID: AtomicU32 = AtomicU32::new(1);

// ============================================================================
// Logging
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`, defaulting to
/// `session_pilot=debug`. Safe to call from every test; only the first
/// call wins.
pub(crate) fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("session_pilot=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// FakePage
// ============================================================================

/// A scriptable in-memory page.
pub(crate) struct FakePage {
    id: PageId,
    current_url: Mutex<String>,
    title: Mutex<String>,
    /// URL `current_url` reports after the next navigation, overriding the
    /// navigated URL. Consumed once.
    url_override: Mutex<Option<String>>,
    navigations: Mutex<Vec<String>>,
    /// Queued evaluation results, consumed FIFO.
    script_results: Mutex<VecDeque<std::result::Result<Value, String>>>,
    /// Result returned when the queue is empty.
    default_result: Mutex<Value>,
    evaluated_scripts: Mutex<Vec<String>>,
    evaluate_count: AtomicUsize,
    show_count: AtomicUsize,
    hide_count: AtomicUsize,
    subscribers: Mutex<Vec<mpsc::Sender<PageEvent>>>,
    /// Events delivered into every future subscription at subscribe time.
    queued_events: Mutex<Vec<PageEvent>>,
    closed: AtomicBool,
}

impl FakePage {
    pub(crate) fn new(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: PageId::new(NEXT_PAGE_ID.fetch_add(1, Ordering::Relaxed)),
            current_url: Mutex::new(url.into()),
            title: Mutex::new(String::new()),
            url_override: Mutex::new(None),
            navigations: Mutex::new(Vec::new()),
            script_results: Mutex::new(VecDeque::new()),
            default_result: Mutex::new(Value::Null),
            evaluated_scripts: Mutex::new(Vec::new()),
            evaluate_count: AtomicUsize::new(0),
            show_count: AtomicUsize::new(0),
            hide_count: AtomicUsize::new(0),
            subscribers: Mutex::new(Vec::new()),
            queued_events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Queues the next evaluation outcome. `Err` surfaces as a script error.
    pub(crate) fn push_script_result(&self, result: std::result::Result<Value, String>) {
        self.script_results.lock().push_back(result);
    }

    /// Sets the result returned once the queue is empty.
    pub(crate) fn set_default_script_result(&self, value: Value) {
        *self.default_result.lock() = value;
    }

    /// Overrides the URL reported after the next navigation.
    pub(crate) fn set_url_after_next_navigation(&self, url: impl Into<String>) {
        *self.url_override.lock() = Some(url.into());
    }

    /// Delivers an event to all current subscribers.
    pub(crate) fn emit(&self, event: PageEvent) {
        for tx in self.subscribers.lock().iter() {
            let _ = tx.try_send(event.clone());
        }
    }

    /// Queues an event delivered into every future subscription.
    pub(crate) fn queue_event(&self, event: PageEvent) {
        self.queued_events.lock().push(event);
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }

    pub(crate) fn evaluated_scripts(&self) -> Vec<String> {
        self.evaluated_scripts.lock().clone()
    }

    pub(crate) fn evaluate_count(&self) -> usize {
        self.evaluate_count.load(Ordering::SeqCst)
    }

    pub(crate) fn show_count(&self) -> usize {
        self.show_count.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn hide_count(&self) -> usize {
        self.hide_count.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Page for FakePage {
    fn id(&self) -> PageId {
        self.id
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.navigations.lock().push(url.to_string());
        let landed = self
            .url_override
            .lock()
            .take()
            .unwrap_or_else(|| url.to_string());
        *self.current_url.lock() = landed;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.current_url.lock().clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.title.lock().clone())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.evaluate_count.fetch_add(1, Ordering::SeqCst);
        self.evaluated_scripts.lock().push(script.to_string());
        match self.script_results.lock().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(Error::script(message, 1)),
            None => Ok(self.default_result.lock().clone()),
        }
    }

    fn subscribe(&self) -> mpsc::Receiver<PageEvent> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        for event in self.queued_events.lock().iter() {
            let _ = tx.try_send(event.clone());
        }
        self.subscribers.lock().push(tx);
        rx
    }

    fn show(&self) {
        self.show_count.fetch_add(1, Ordering::SeqCst);
    }

    fn hide(&self) {
        self.hide_count.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// FakeBrowser
// ============================================================================

/// Hands out pre-built pages in order.
pub(crate) struct FakeBrowser {
    pages: Mutex<VecDeque<Arc<FakePage>>>,
}

impl FakeBrowser {
    pub(crate) fn with_pages(pages: Vec<Arc<FakePage>>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into()),
        })
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open_page(&self) -> Result<Arc<dyn Page>> {
        let page = self
            .pages
            .lock()
            .pop_front()
            .ok_or_else(|| Error::navigation("fake browser has no pages left"))?;
        Ok(page)
    }
}
