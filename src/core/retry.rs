//! Bounded retry with linear or exponential backoff.
//!
//! Failure detection is by `Err`, not by value: an operation that succeeds
//! with an "empty" value (e.g. `Ok(None)`) is returned as-is. After the last
//! attempt the final error is always propagated.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Shape of the delay schedule between attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// interval * (attempt + 1)
    #[default]
    Linear,

    /// interval * 2^attempt
    Exponential,
}

/// Retry policy for remote calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts in milliseconds
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// Upper bound for any single delay in milliseconds
    #[serde(default = "default_max_retry_interval")]
    pub max_retry_interval_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_interval() -> u64 {
    1000
}
fn default_max_retry_interval() -> u64 {
    10000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_interval_ms: default_retry_interval(),
            max_retry_interval_ms: default_max_retry_interval(),
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_interval: Duration, max_retry_interval: Duration, backoff: Backoff) -> Self {
        Self {
            max_retries,
            retry_interval_ms: retry_interval.as_millis() as u64,
            max_retry_interval_ms: max_retry_interval.as_millis() as u64,
            backoff,
        }
    }

    /// Effective number of attempts (at least one)
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay after the failed attempt with the given 0-based index
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = match self.backoff {
            Backoff::Linear => u64::from(attempt) + 1,
            Backoff::Exponential => 2u64.checked_pow(attempt).unwrap_or(u64::MAX),
        };

        let delay = self.retry_interval_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_retry_interval_ms))
    }

    /// Delays slept when every attempt fails
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.attempts() - 1)
            .map(|attempt| self.delay_for_attempt(attempt))
            .collect()
    }

    /// Check if another attempt follows the given 0-based attempt
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.attempts()
    }

    /// Run `operation` until it succeeds or attempts are exhausted.
    ///
    /// Sleeps are plain tokio sleeps, so dropping the returned future (for
    /// instance on a run timeout) interrupts them.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if self.should_retry(attempt) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempts = attempt + 1, error = %e, "Operation failed permanently");
                    return Err(e);
                }
            }
        }
    }
}
