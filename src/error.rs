//! Error types for session orchestration.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use session_pilot::{Result, Session};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     session.ensure_on_target_page().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Navigation | [`Error::Navigation`], [`Error::PageClosed`] |
//! | Execution | [`Error::Script`], [`Error::Timeout`] |
//! | Human intervention | [`Error::LoginTimeout`], [`Error::CaptchaTimeout`], [`Error::CaptchaSkipped`], [`Error::AlreadyHandling`] |
//! | Replay | [`Error::PageFunctionMissing`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Navigation Errors
    // ========================================================================
    /// Page failed to load or verify.
    ///
    /// Returned when navigation succeeds at the transport level but the
    /// expected page markers never appear. Not retried at this layer.
    #[error("Navigation failed: {message}")]
    Navigation {
        /// Description of the navigation failure.
        message: String,
    },

    /// The backend page is gone.
    ///
    /// Returned when an operation targets a page that has been closed.
    #[error("Page closed")]
    PageClosed,

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// In-page script execution failed.
    ///
    /// Carries the terminal error message and the total number of attempts
    /// made before giving up.
    #[error("Script failed after {attempts} attempt(s): {message}")]
    Script {
        /// Error message from the last attempt.
        message: String,
        /// Total attempts made, including the failing one.
        attempts: u32,
    },

    /// Operation timeout.
    ///
    /// Returned when an operation exceeds its timeout duration.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Human-Intervention Errors
    // ========================================================================
    /// Human did not complete login in time.
    ///
    /// Terminal for the calling operation; the session stays usable and a
    /// later call may restart the login-wait protocol.
    #[error("Login not completed within {timeout_ms}ms")]
    LoginTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Challenge was not resolved within the hard timeout.
    #[error("Captcha not resolved within {timeout_ms}ms")]
    CaptchaTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Human explicitly skipped the challenge.
    ///
    /// Automation must not silently proceed past an unresolved challenge.
    #[error("Captcha skipped by user")]
    CaptchaSkipped,

    /// A challenge is already being handled.
    ///
    /// Returned by the re-entrancy guard when a second `handle` call arrives
    /// while one challenge is in flight.
    #[error("A captcha is already being handled")]
    AlreadyHandling,

    // ========================================================================
    // Replay Errors
    // ========================================================================
    /// Named page function is absent or not callable.
    ///
    /// Returned by function-based replay when the page global does not exist.
    #[error("Page function not callable: {name}")]
    PageFunctionMissing {
        /// Name of the missing page global.
        name: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a navigation error.
    #[inline]
    pub fn navigation(message: impl Into<String>) -> Self {
        Self::Navigation {
            message: message.into(),
        }
    }

    /// Creates a script error.
    #[inline]
    pub fn script(message: impl Into<String>, attempts: u32) -> Self {
        Self::Script {
            message: message.into(),
            attempts,
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a login timeout error.
    #[inline]
    pub fn login_timeout(timeout_ms: u64) -> Self {
        Self::LoginTimeout { timeout_ms }
    }

    /// Creates a captcha timeout error.
    #[inline]
    pub fn captcha_timeout(timeout_ms: u64) -> Self {
        Self::CaptchaTimeout { timeout_ms }
    }

    /// Creates a missing page function error.
    #[inline]
    pub fn page_function_missing(name: impl Into<String>) -> Self {
        Self::PageFunctionMissing { name: name.into() }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::LoginTimeout { .. } | Self::CaptchaTimeout { .. }
        )
    }

    /// Returns `true` if this error may succeed on retry.
    ///
    /// Script and plain timeout failures are transient; login and challenge
    /// failures are not, since they wait on a human.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Script { .. } | Self::Timeout { .. })
    }

    /// Returns `true` if resolving this error requires human action.
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        matches!(
            self,
            Self::LoginTimeout { .. }
                | Self::CaptchaTimeout { .. }
                | Self::CaptchaSkipped
                | Self::AlreadyHandling
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::navigation("home markers absent");
        assert_eq!(err.to_string(), "Navigation failed: home markers absent");
    }

    #[test]
    fn test_script_error_carries_attempts() {
        let err = Error::script("ReferenceError: x is not defined", 3);
        assert_eq!(
            err.to_string(),
            "Script failed after 3 attempt(s): ReferenceError: x is not defined"
        );
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::login_timeout(100).is_timeout());
        assert!(Error::captcha_timeout(300_000).is_timeout());
        assert!(Error::timeout("network idle", 5000).is_timeout());
        assert!(!Error::CaptchaSkipped.is_timeout());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::script("boom", 1).is_recoverable());
        assert!(Error::timeout("settle", 2000).is_recoverable());
        assert!(!Error::login_timeout(100).is_recoverable());
        assert!(!Error::config("bad viewport").is_recoverable());
    }

    #[test]
    fn test_requires_human() {
        assert!(Error::login_timeout(100).requires_human());
        assert!(Error::CaptchaSkipped.requires_human());
        assert!(Error::AlreadyHandling.requires_human());
        assert!(!Error::navigation("nope").requires_human());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
