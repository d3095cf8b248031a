//! Session management.
//!
//! This module owns the one long-lived authenticated page:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | The live session: lifecycle, history, login state |
//! | [`PageState`] | Classification of what is currently rendered |
//! | [`CaptchaHandler`] | Challenge detection and manual resolution |

// ============================================================================
// Submodules
// ============================================================================

/// Challenge detection and handling.
pub mod captcha;

/// Session handle and lifecycle.
pub mod core;

/// Login-wait protocol and target-page assurance.
pub(crate) mod login;

/// Page state classification.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use captcha::{CaptchaHandler, CaptchaInfo, CaptchaKind, CaptchaResult};
pub use core::{LoginStatus, NavigationEvent, Session};
pub use state::{DomProbes, PageState, classify};
