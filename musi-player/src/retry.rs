//! Retry policy for playback I/O
//!
//! One value object describes how many times an operation is attempted and
//! how long to wait between attempts. The controller applies the same
//! policy to the probe → reload → attach sequence of every track.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// Doubling delay starting at `initial`, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Single attempt, no retry
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Run `operation` until it succeeds or attempts run out
    ///
    /// The closure receives the 1-based attempt number. Every failure is
    /// logged; the last error is returned once attempts are exhausted.
    /// Non-transient errors stop the loop immediately.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !err.is_transient() || attempt >= self.max_attempts {
                        tracing::error!(
                            operation = operation_name,
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %err,
                            "Operation failed, giving up"
                        );
                        return Err(err);
                    }

                    let delay = self.backoff.delay_after(attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }
}
