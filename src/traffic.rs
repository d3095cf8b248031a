//! Shared traffic data types.
//!
//! [`RequestLog`] is what the observer captures; [`RequestSample`] is what
//! the replayer consumes. A log entry converts into a sample so captured
//! traffic can be replayed directly.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::identifiers::CaptureId;

// ============================================================================
// ResponseInfo
// ============================================================================

/// Response half of a captured exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: FxHashMap<String, String>,
    /// Response body, if captured.
    pub body: Option<String>,
}

// ============================================================================
// RequestLog
// ============================================================================

/// One captured outgoing request.
///
/// Immutable once captured, except for the `response` slot which is filled
/// in asynchronously when the request's completion event arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLog {
    /// Correlation ID assigned by the backend.
    pub id: CaptureId,
    /// Request URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Request headers.
    pub headers: FxHashMap<String, String>,
    /// Request body bytes, if any.
    pub body: Option<Vec<u8>>,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Response, filled when the completion is observed.
    pub response: Option<ResponseInfo>,
}

impl RequestLog {
    /// Converts this entry into a replayable sample.
    ///
    /// Non-UTF-8 bodies are dropped since the in-page `fetch` replay carries
    /// the body as a string.
    #[must_use]
    pub fn to_sample(&self) -> RequestSample {
        RequestSample {
            url: self.url.clone(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self
                .body
                .as_ref()
                .and_then(|b| String::from_utf8(b.clone()).ok()),
        }
    }
}

// ============================================================================
// RequestSample
// ============================================================================

/// The unit consumed by the request replayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSample {
    /// Request URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Request headers.
    pub headers: FxHashMap<String, String>,
    /// Request body, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RequestSample {
    /// Creates a sample with no headers or body.
    #[must_use]
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: FxHashMap::default(),
            body: None,
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
