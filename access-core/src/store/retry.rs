//! Retried units of work
//!
//! A transient failure (write conflict, deadlock) re-runs the whole unit of
//! work from the start, up to a configured number of attempts. Any other
//! failure, or the last transient one, is returned unchanged.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::sync::Arc;

/// Decides whether an error is worth another attempt
pub type TransientClassifier = Arc<dyn Fn(&CoreError) -> bool + Send + Sync>;

/// Run `op` until it succeeds, fails permanently, or `attempts` runs are used
///
/// `op` receives the 1-based attempt number. Values below 1 still run once.
pub fn with_retry<T, F, C>(attempts: u32, is_transient: C, mut op: F) -> CoreResult<T>
where
    F: FnMut(u32) -> CoreResult<T>,
    C: Fn(&CoreError) -> bool,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_transient(&e) => {
                tracing::warn!(
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Transient failure, retrying transaction"
                );
                attempt += 1;
            }
            Err(e) => {
                if attempt > 1 {
                    tracing::error!(attempt, error = %e, "Transaction failed after retries");
                }
                return Err(e);
            }
        }
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    attempts: u32,
    classifier: TransientClassifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TRANSACTION_RETRIES)
    }
}

impl RetryPolicy {
    /// Retry on [`CoreError::is_transient`]
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            classifier: Arc::new(CoreError::is_transient),
        }
    }

    pub fn with_classifier(mut self, classifier: impl Fn(&CoreError) -> bool + Send + Sync + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn run<T>(&self, op: impl FnMut(u32) -> CoreResult<T>) -> CoreResult<T> {
        with_retry(self.attempts, |e| (self.classifier)(e), op)
    }
}
