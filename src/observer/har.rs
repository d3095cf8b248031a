//! HAR-format export of captured traffic.
//!
//! Captured exchanges are written as a HAR 1.2 document so the artifact
//! opens in ordinary traffic-inspection tooling. Entries preserve capture
//! order. Request bodies that are not valid UTF-8 are base64-encoded with
//! the standard `encoding` field.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::traffic::{RequestLog, ResponseInfo};

// ============================================================================
// Types
// ============================================================================

/// Top-level HAR document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Har {
    /// The single log object.
    pub log: HarLog,
}

/// The `log` object of a HAR document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarLog {
    /// Format version, always `"1.2"`.
    pub version: String,
    /// Producing tool.
    pub creator: HarCreator,
    /// Captured exchanges in capture order.
    pub entries: Vec<HarEntry>,
}

/// Tool identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarCreator {
    /// Tool name.
    pub name: String,
    /// Tool version.
    pub version: String,
}

/// One captured exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarEntry {
    /// Capture time of the request.
    #[serde(rename = "startedDateTime")]
    pub started_date_time: DateTime<Utc>,
    /// The request half.
    pub request: HarRequest,
    /// The response half; absent when no completion was observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<HarResponse>,
}

/// Request half of an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarRequest {
    /// HTTP method.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// Request headers as name/value pairs.
    pub headers: Vec<HarHeader>,
    /// Request body, if any.
    #[serde(rename = "postData", default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<HarPostData>,
}

/// Response half of an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers as name/value pairs.
    pub headers: Vec<HarHeader>,
    /// Response body text, if captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A single header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Request body with optional transfer encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarPostData {
    /// Body text, base64-encoded when `encoding` says so.
    pub text: String,
    /// `"base64"` when the body was not valid UTF-8.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

// ============================================================================
// Conversion
// ============================================================================

impl Har {
    /// Builds a HAR document from captured requests, preserving order.
    #[must_use]
    pub fn from_requests(requests: &[RequestLog]) -> Self {
        Self {
            log: HarLog {
                version: "1.2".to_string(),
                creator: HarCreator {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                entries: requests.iter().map(HarEntry::from_log).collect(),
            },
        }
    }
}

impl HarEntry {
    fn from_log(log: &RequestLog) -> Self {
        Self {
            started_date_time: log.timestamp,
            request: HarRequest {
                method: log.method.clone(),
                url: log.url.clone(),
                headers: headers_to_pairs(&log.headers),
                post_data: log.body.as_deref().map(HarPostData::from_bytes),
            },
            response: log.response.as_ref().map(HarResponse::from_info),
        }
    }
}

impl HarResponse {
    fn from_info(info: &ResponseInfo) -> Self {
        Self {
            status: info.status,
            headers: headers_to_pairs(&info.headers),
            content: info.body.clone(),
        }
    }
}

impl HarPostData {
    fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self {
                text: text.to_string(),
                encoding: None,
            },
            Err(_) => Self {
                text: BASE64.encode(bytes),
                encoding: Some("base64".to_string()),
            },
        }
    }
}

fn headers_to_pairs(headers: &rustc_hash::FxHashMap<String, String>) -> Vec<HarHeader> {
    let mut pairs: Vec<HarHeader> = headers
        .iter()
        .map(|(name, value)| HarHeader {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();
    // Hash maps iterate in arbitrary order; sort for a stable artifact.
    pairs.sort_by(|a, b| a.name.cmp(&b.name));
    pairs
}

// ============================================================================
// Writing
// ============================================================================

/// Writes captured requests to `<dir>/exchange-<epoch-millis>.har`.
///
/// The directory is created if missing. Returns the path written.
pub async fn write_har(dir: &Path, requests: &[RequestLog]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(format!("exchange-{}.har", Utc::now().timestamp_millis()));
    let har = Har::from_requests(requests);
    let bytes = serde_json::to_vec_pretty(&har)?;
    tokio::fs::write(&path, bytes).await?;

    info!(path = %path.display(), entries = requests.len(), "Exchange log written");
    Ok(path)
}

// ============================================================================
// Tests
// ============================================================================
