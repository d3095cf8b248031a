//! Scripted page actions.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::commands::PageCommand;

// ============================================================================
// Action
// ============================================================================

/// One step of a scripted interaction sequence.
///
/// Actions are executed strictly in order; a failed action aborts the rest
/// of the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Action {
    /// Click the first element matching a selector.
    Click {
        /// CSS selector.
        selector: String,
    },
    /// Fill the first element matching a selector.
    Input {
        /// CSS selector.
        selector: String,
        /// Value to set.
        value: String,
    },
    /// Scroll the page vertically.
    Scroll {
        /// Pixels to scroll by.
        pixels: i64,
    },
    /// Pause between steps.
    Wait {
        /// Milliseconds to wait.
        duration_ms: u64,
    },
}

impl Action {
    /// Converts the action into its page command, if it has one.
    ///
    /// [`Action::Wait`] is handled by the driver itself and has no
    /// in-page counterpart.
    #[must_use]
    pub(crate) fn to_command(&self) -> Option<PageCommand> {
        match self {
            Self::Click { selector } => Some(PageCommand::Click {
                selector: selector.clone(),
            }),
            Self::Input { selector, value } => Some(PageCommand::Input {
                selector: selector.clone(),
                value: value.clone(),
            }),
            Self::Scroll { pixels } => Some(PageCommand::Scroll { pixels: *pixels }),
            Self::Wait { .. } => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_shape() {
        let action = Action::Click {
            selector: ".compose".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "click");
        assert_eq!(json["selector"], ".compose");

        let parsed: Action =
            serde_json::from_str(r#"{"type":"wait","duration_ms":500}"#).unwrap();
        assert_eq!(parsed, Action::Wait { duration_ms: 500 });
    }

    #[test]
    fn test_wait_has_no_command() {
        assert!(Action::Wait { duration_ms: 1 }.to_command().is_none());
        assert!(
            Action::Scroll { pixels: 300 }
                .to_command()
                .is_some()
        );
    }
}
