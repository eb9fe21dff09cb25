//! Retry decisions for failed attempts.
//!
//! A job gets `retry_limit + 1` attempts in total. The delay before each retry
//! is the configured `retry_delay` unless a non-fixed [`BackoffStrategy`] is
//! selected.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::job::JobError;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Every retry waits the base delay
    #[default]
    Fixed,
    /// base + increment * (retry - 1)
    Linear { increment_ms: u64 },
    /// base * multiplier^(retry - 1), capped
    Exponential { multiplier: f64, max_delay_ms: u64 },
}

impl BackoffStrategy {
    /// Delay before the `retry`-th retry (1-indexed).
    pub fn delay_for_retry(&self, base: Duration, retry: u32) -> Duration {
        let step = retry.saturating_sub(1);
        match self {
            Self::Fixed => base,
            Self::Linear { increment_ms } => {
                base + Duration::from_millis(increment_ms.saturating_mul(u64::from(step)))
            }
            Self::Exponential {
                multiplier,
                max_delay_ms,
            } => {
                let delay = base.as_millis() as f64 * multiplier.powi(step as i32);
                let capped = delay.min(*max_delay_ms as f64).max(0.0);
                Duration::from_millis(capped as u64)
            }
        }
    }
}

/// What to do with a job whose attempt just failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Re-admit the job after `delay`
    Retry { delay: Duration, max_attempts: u32 },
    /// Attempts exhausted or the error is not retryable
    GiveUp { attempts: u32 },
}

/// Retry policy shared by the scheduler and the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub retry_limit: u32,
    /// Base delay before a retry
    pub retry_delay: Duration,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 2,
            retry_delay: Duration::from_secs(2),
            backoff: BackoffStrategy::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn new(retry_limit: u32, retry_delay: Duration) -> Self {
        Self {
            retry_limit,
            retry_delay,
            backoff: BackoffStrategy::Fixed,
        }
    }

    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }

    /// Decide what follows a failed attempt. `attempts` counts the attempt that
    /// just failed.
    pub fn decide(&self, attempts: u32, error: &JobError) -> RetryDecision {
        if error.is_retryable() && attempts < self.max_attempts() {
            RetryDecision::Retry {
                delay: self.backoff.delay_for_retry(self.retry_delay, attempts),
                max_attempts: self.max_attempts(),
            }
        } else {
            RetryDecision::GiveUp { attempts }
        }
    }
}
