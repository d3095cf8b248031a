//! Traffic observation.
//!
//! Captures the request traffic a page interaction produces and writes it
//! as a HAR 1.2 artifact:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RequestObserver`] | Drives a dedicated capture page |
//! | [`Action`] | One step of a scripted interaction sequence |
//! | [`Har`] | The written artifact's document model |

// ============================================================================
// Submodules
// ============================================================================

/// Scripted page actions.
pub mod actions;

/// Dedicated-page traffic capture.
pub mod capture;

/// HAR-format export.
pub mod har;

// ============================================================================
// Re-exports
// ============================================================================

pub use actions::Action;
pub use capture::{Observation, RequestObserver};
pub use har::{Har, HarEntry, HarLog, write_har};
