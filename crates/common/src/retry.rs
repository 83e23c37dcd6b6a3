//! Bounded retry with a fixed delay
//!
//! Every remote write the renewer performs against a shared, externally owned
//! resource (DNS zone, WAF policy, certificate store) goes through the same
//! retry discipline: a fixed number of attempts with a fixed sleep between
//! them. Concurrent writers to those resources are expected to fail with
//! transient "resource is being modified" style errors, which a short wait
//! usually resolves.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

/// Default number of attempts (including the first one)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between attempts
pub const DEFAULT_DELAY: Duration = Duration::from_secs(30);

// ============================================================================
// Retry Policy
// ============================================================================

/// Fixed-delay retry policy
///
/// The policy is stateless; the attempt counter lives only for the duration
/// of a single [`RetryPolicy::run`] call.
///
/// # Example
///
/// ```ignore
/// let policy = RetryPolicy::default();
///
/// policy
///     .run("example.com", "dns update", || async { update_zone().await })
///     .await?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, never less than one
    max_attempts: u32,
    /// Sleep between two consecutive attempts
    delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// `max_attempts` is clamped to a minimum of 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Maximum number of attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between attempts
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds or the attempts are exhausted
    ///
    /// Intermediate failures are logged as warnings. When the last attempt
    /// fails the error is logged with the subject and returned unchanged.
    ///
    /// # Arguments
    ///
    /// * `subject` - Certificate subject the operation is performed for (log context)
    /// * `operation` - Short human readable name of the operation (log context)
    /// * `operation_fn` - Produces a fresh future for every attempt
    pub async fn run<T, E, F, Fut>(
        &self,
        subject: &str,
        operation: &str,
        mut operation_fn: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;

        loop {
            match operation_fn().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            domain = %subject,
                            operation = operation,
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= self.max_attempts => {
                    error!(
                        domain = %subject,
                        operation = operation,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after {} attempts",
                        self.max_attempts
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        domain = %subject,
                        operation = operation,
                        attempt = attempt,
                        error = %e,
                        retry_in_secs = self.delay.as_secs(),
                        "Retrying operation due to error"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}
