//! Bounded retry with a fixed backoff schedule.
//!
//! Only errors that report themselves retryable are retried. Anything else fails on the
//! first attempt. When every attempt fails, the last underlying error is returned as-is.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

/// Classifies an error as transient (worth another attempt) or permanent.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(45),
            ],
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `failed_attempts` failures (1-based).
    /// Attempts beyond the schedule reuse its last entry.
    pub fn backoff_for(&self, failed_attempts: u32) -> Duration {
        let index = failed_attempts.saturating_sub(1) as usize;
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                backoff: policy.backoff,
            },
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempt budget is spent.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => {
                    warn!("{operation} failed permanently on attempt {attempt}: {err}");
                    return Err(err);
                }
                Err(err) if attempt >= self.policy.max_attempts => {
                    error!("{operation} failed after {attempt} attempts: {err}");
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.policy.backoff_for(attempt);
                    warn!(
                        "{operation} attempt {attempt}/{} failed: {err}; retrying in {}ms",
                        self.policy.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
