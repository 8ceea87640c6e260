//! Synchronous bounded-retry-with-backoff combinator.
//!
//! Used by the planning call, which is a single blocking HTTP request that
//! may transiently fail — unrelated to the async poll loops elsewhere in
//! the workspace. The combinator takes the operation as a closure instead
//! of wrapping it aspect-style, so retry count and backoff are explicit at
//! the call site.

use std::time::Duration;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Factor by which the delay grows after each failed attempt.
    pub backoff_exp: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
            backoff_exp: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the failure of attempt `attempt` (0-based):
    /// `delay * backoff_exp^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_exp.powi(attempt as i32);
        Duration::from_millis((self.delay.as_millis() as f64 * factor) as u64)
    }
}

/// Structured failure returned once all attempts are exhausted.
///
/// Callers always receive a value — the combinator never panics on the
/// wrapped operation's behalf.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{op} failed after {attempts} attempts: {message}")]
pub struct RetryError {
    /// Name of the wrapped operation, for logs and messages.
    pub op: String,
    /// Total attempts performed.
    pub attempts: u32,
    /// Message of the last failure.
    pub message: String,
}

/// Run `op` up to `max_retries + 1` times, sleeping with exponential
/// backoff between failed attempts.
///
/// Sleeps synchronously (`std::thread::sleep`) — never call this from an
/// async context without `spawn_blocking`.
pub fn retry_with_backoff<T, E: std::fmt::Display>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, RetryError> {
    let total_attempts = policy.max_retries + 1;
    let mut last_message = String::new();

    for attempt in 0..total_attempts {
        tracing::info!(op = op_name, attempt = attempt + 1, total_attempts, "Attempt");

        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_message = e.to_string();
                tracing::warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    error = %e,
                    "Attempt failed"
                );

                if attempt + 1 < total_attempts {
                    let wait = policy.backoff_delay(attempt);
                    tracing::info!(
                        op = op_name,
                        wait_ms = wait.as_millis() as u64,
                        "Retrying after backoff"
                    );
                    std::thread::sleep(wait);
                }
            }
        }
    }

    tracing::error!(op = op_name, attempts = total_attempts, "All attempts failed");
    Err(RetryError {
        op: op_name.to_string(),
        attempts: total_attempts,
        message: last_message,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
