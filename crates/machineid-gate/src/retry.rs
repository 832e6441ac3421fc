//! Exponential backoff for the validate call.
//!
//! Only transport-level failures are retried. A decision returned by the
//! authority, including an explicit deny, is never retried.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{GateError, GateResult};

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

impl RetryPolicy {
    /// Create a policy with the given retry budget and default backoff
    /// (250ms base, 5s cap).
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }

    /// A policy that performs exactly one attempt.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Whether the error should be retried at the given attempt number.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &GateError) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    /// Delay before the retry following `attempt`:
    /// `min(base_delay * 2^attempt, max_delay)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Execute an async operation with retry.
    ///
    /// Returns the first success, the first non-transient error, or the last
    /// transient error once the budget is exhausted.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut f: F) -> GateResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = GateResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.should_retry(attempt, &error) {
                        if attempt > 0 {
                            warn!(
                                operation = operation_name,
                                attempts = attempt + 1,
                                error = %error,
                                "giving up after retries"
                            );
                        }
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
