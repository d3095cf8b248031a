//! Type-safe identifiers for session entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// PageId
// ============================================================================

/// Identifier for a backend page instance.
///
/// The session page and every observer/replay page get distinct IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(u32);

impl PageId {
    /// Creates a new page ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page-{}", self.0)
    }
}

// ============================================================================
// CaptureId
// ============================================================================

/// Identifier for a captured request within one page's lifetime.
///
/// Used to correlate a request event with its completion event so the
/// response slot of the right log entry is filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureId(u64);

impl CaptureId {
    /// Creates a new capture ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId::new(7).to_string(), "page-7");
    }

    #[test]
    fn test_capture_id_roundtrip() {
        let id = CaptureId::new(42);
        assert_eq!(id.value(), 42);
        assert_eq!(id.to_string(), "req-42");
    }

    #[test]
    fn test_ids_are_distinct_types() {
        fn takes_page(_: PageId) {}
        takes_page(PageId::new(1));
    }
}
