//! Script execution with bounded retries.
//!
//! [`ScriptExecutor`] runs a [`PageCommand`] inside a page's execution
//! context and retries transient failures with exponential backoff. Each
//! attempt is independent; no partial state carries over between attempts.
//!
//! Retrying an effectful command that failed *after* taking effect can
//! duplicate the effect. That is the caller's contract to manage; the
//! executor logs a warning when it retries an effectful command so the
//! duplication risk is visible.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backend::Page;
use crate::commands::PageCommand;
use crate::config::RetryPolicy;
use crate::error::{Error, Result};

// ============================================================================
// ScriptExecutor
// ============================================================================

/// Executes structured commands on one page with bounded retries.
#[derive(Clone)]
pub struct ScriptExecutor {
    /// The page commands run against.
    page: Arc<dyn Page>,
    /// Retry policy.
    policy: RetryPolicy,
}

impl ScriptExecutor {
    /// Creates an executor for a page.
    #[must_use]
    pub fn new(page: Arc<dyn Page>, policy: RetryPolicy) -> Self {
        Self { page, policy }
    }

    /// Returns the page this executor drives.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    /// Executes a command, retrying failures with exponential backoff.
    ///
    /// Attempts are sequential, never parallel. On exhaustion the last
    /// error is surfaced as [`Error::Script`] carrying the full attempt
    /// count.
    ///
    /// # Errors
    ///
    /// - [`Error::Script`] after `max_attempts` consecutive failures
    pub async fn execute(&self, command: &PageCommand) -> Result<Value> {
        let script = command.render();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_message = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 && command.is_effectful() {
                warn!(
                    page_id = %self.page.id(),
                    command = command.name(),
                    attempt = attempt + 1,
                    "Retrying effectful command; a completed earlier attempt would be duplicated"
                );
            }

            match self.page.evaluate(&script).await {
                Ok(value) => {
                    debug!(
                        page_id = %self.page.id(),
                        command = command.name(),
                        attempts = attempt + 1,
                        "Command executed"
                    );
                    return Ok(value);
                }
                Err(err) => {
                    last_message = err.to_string();
                    debug!(
                        page_id = %self.page.id(),
                        command = command.name(),
                        attempt = attempt + 1,
                        error = %last_message,
                        "Command attempt failed"
                    );
                    if attempt + 1 < max_attempts {
                        sleep(self.policy.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(Error::script(last_message, max_attempts))
    }

    /// Executes a command exactly once, without retries.
    ///
    /// Used where the caller owns the retry decision, e.g. polling loops
    /// that would rather skip a cycle than stack backoff on top of their
    /// own interval.
    pub async fn execute_once(&self, command: &PageCommand) -> Result<Value> {
        self.page.evaluate(&command.render()).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::testing::FakePage;

    fn executor(page: Arc<FakePage>) -> ScriptExecutor {
        ScriptExecutor::new(page, RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_first_attempt() {
        let page = FakePage::new("https://example.com/");
        page.push_script_result(Ok(Value::from(42)));

        let result = executor(Arc::clone(&page))
            .execute(&PageCommand::Snapshot)
            .await
            .unwrap();

        assert_eq!(result, Value::from(42));
        assert_eq!(page.evaluate_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_k_times_then_succeeds() {
        let page = FakePage::new("https://example.com/");
        // k = 2 failures, then success: total attempts must be k + 1.
        page.push_script_result(Err("transient".to_string()));
        page.push_script_result(Err("transient".to_string()));
        page.push_script_result(Ok(Value::from("ok")));

        let result = executor(Arc::clone(&page))
            .execute(&PageCommand::Snapshot)
            .await
            .unwrap();

        assert_eq!(result, Value::from("ok"));
        assert_eq!(page.evaluate_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_attempt_count() {
        let page = FakePage::new("https://example.com/");
        for _ in 0..5 {
            page.push_script_result(Err("always fails".to_string()));
        }

        let err = executor(Arc::clone(&page))
            .execute(&PageCommand::Snapshot)
            .await
            .unwrap_err();

        // Exactly max_attempts evaluations, no more.
        assert_eq!(page.evaluate_count(), 3);
        match err {
            Error::Script { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("always fails"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_between_attempts() {
        let page = FakePage::new("https://example.com/");
        page.push_script_result(Err("fail".to_string()));
        page.push_script_result(Err("fail".to_string()));
        page.push_script_result(Ok(Value::Null));

        let started = tokio::time::Instant::now();
        executor(Arc::clone(&page))
            .execute(&PageCommand::Snapshot)
            .await
            .unwrap();

        // 1s after the first failure, 2s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_once_never_retries() {
        let page = FakePage::new("https://example.com/");
        page.push_script_result(Err("fail".to_string()));

        let err = executor(Arc::clone(&page))
            .execute_once(&PageCommand::Snapshot)
            .await
            .unwrap_err();

        assert_eq!(page.evaluate_count(), 1);
        assert!(matches!(err, Error::Script { attempts: 1, .. }));
    }
}
