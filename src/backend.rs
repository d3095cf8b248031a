//! Backend seam: the traits the orchestration layer drives.
//!
//! The actual browser (embedded webview, remote driver, extension bridge) is
//! an external collaborator. This module defines the narrow interface the
//! rest of the crate consumes:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`Browser`] | Spawns independent page instances from one browsing context |
//! | [`Page`] | One live page: navigation, script evaluation, visibility, events |
//!
//! # Event delivery
//!
//! Navigation and network events are pushed onto a bounded per-subscriber
//! queue that consumers drain via [`Page::subscribe`]. Backends must attach
//! the event source before `navigate` resolves so subscribers registered
//! pre-navigation observe every request. When a subscriber's queue is full
//! the backend drops the newest event for that subscriber and logs the drop;
//! ordering of delivered events is always arrival order.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::identifiers::{CaptureId, PageId};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of each subscriber's event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

// ============================================================================
// NavigationKind
// ============================================================================

/// Distinguishes full page loads from in-page (history API) navigations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationKind {
    /// Top-level document navigation.
    TopLevel,
    /// In-page navigation (pushState / fragment).
    InPage,
}

// ============================================================================
// PageEvent
// ============================================================================

/// Event emitted by a [`Page`].
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// The page navigated.
    Navigated {
        /// URL after navigation.
        url: String,
        /// Document title after navigation (may lag the URL).
        title: String,
        /// Navigation kind.
        kind: NavigationKind,
    },
    /// An outgoing request left the page.
    RequestSent {
        /// Correlation ID, unique within the page's lifetime.
        id: CaptureId,
        /// Request URL.
        url: String,
        /// HTTP method.
        method: String,
        /// Request headers.
        headers: FxHashMap<String, String>,
        /// Request body, if any.
        body: Option<Vec<u8>>,
    },
    /// A previously sent request completed.
    RequestCompleted {
        /// Correlation ID matching the earlier [`PageEvent::RequestSent`].
        id: CaptureId,
        /// HTTP status code.
        status: u16,
        /// Response headers.
        headers: FxHashMap<String, String>,
        /// Response body, if the backend captured it.
        body: Option<String>,
    },
    /// The page was closed by the backend.
    Closed,
}

// ============================================================================
// Page
// ============================================================================

/// One live page instance.
///
/// The session page and the short-lived observer/replay pages all implement
/// this trait. All methods are cancel-safe; callers race them against
/// timeouts freely.
#[async_trait]
pub trait Page: Send + Sync {
    /// Returns the page's identifier.
    fn id(&self) -> PageId;

    /// Navigates to a URL and resolves once the load is committed.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Returns the current URL.
    async fn current_url(&self) -> Result<String>;

    /// Returns the current document title.
    async fn title(&self) -> Result<String>;

    /// Evaluates a self-contained script in the page's execution context.
    ///
    /// The script must return a JSON-serializable value or throw; thrown
    /// errors surface as [`Error::Script`](crate::Error::Script) with one
    /// attempt. The backend does not inspect or sandbox script content.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Subscribes to this page's event stream.
    ///
    /// The returned queue is bounded by [`EVENT_QUEUE_CAPACITY`]; see the
    /// module docs for the drop contract.
    fn subscribe(&self) -> mpsc::Receiver<PageEvent>;

    /// Makes the window hosting this page visible and focused.
    fn show(&self);

    /// Hides the window hosting this page.
    fn hide(&self);

    /// Closes the page and releases backend resources.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Browser
// ============================================================================

/// A browsing context that can spawn independent pages.
///
/// All pages opened from one browser share cookies and storage, which is
/// what lets observer and replay pages reuse the session's authentication
/// state without re-deriving it.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Opens a fresh page.
    async fn open_page(&self) -> Result<Arc<dyn Page>>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_kind_serde() {
        let json = serde_json::to_string(&NavigationKind::InPage).unwrap();
        assert_eq!(json, "\"in-page\"");
        let kind: NavigationKind = serde_json::from_str("\"top-level\"").unwrap();
        assert_eq!(kind, NavigationKind::TopLevel);
    }

    #[test]
    fn test_page_event_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<PageEvent>();
    }
}
