//! Fixed-delay retry for recoverable invocation failures.

use crate::error::InvokeError;
use std::thread;
use std::time::Duration;

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback: Sync {
    /// Called before sleeping ahead of the next attempt.
    ///
    /// # Arguments
    /// * `attempt` - The attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &InvokeError, delay: Duration);
}

/// No-op callback.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &InvokeError, _delay: Duration) {}
}

/// Callback that reports retries through the `log` facade.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &InvokeError, delay: Duration) {
        log::warn!(
            "Attempt {}/{} failed: {}. Retrying in {}s...",
            attempt,
            max_attempts,
            error,
            delay.as_secs()
        );
    }
}

/// Execute an operation, retrying recoverable failures.
///
/// The operation receives the 1-indexed attempt number. Fatal errors are
/// returned at once. A recoverable error on the last attempt is escalated
/// to fatal.
pub fn with_retry<T, F>(
    policy: &RetryPolicy,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T, InvokeError>
where
    F: FnMut(u32) -> Result<T, InvokeError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                return Err(InvokeError::fatal(format!(
                    "gave up after {} attempt{}: {}",
                    attempt,
                    if attempt == 1 { "" } else { "s" },
                    e.reason()
                )));
            }
            Err(e) => {
                if let Some(cb) = callback {
                    cb.on_retry(attempt, max_attempts, &e, policy.delay);
                }
                thread::sleep(policy.delay);
                attempt += 1;
            }
        }
    }
}
