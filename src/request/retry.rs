//! Retry policies: per-request timeout and attempt budget.

use std::time::Duration;

use super::error::RequestError;

/// Default socket timeout for the first attempt.
pub const DEFAULT_TIMEOUT_MS: u64 = 2500;
/// Default retry budget (no retries).
pub const DEFAULT_MAX_RETRIES: u32 = 0;
/// Default timeout growth factor per retry.
pub const DEFAULT_BACKOFF_MULTIPLIER: f32 = 1.0;
/// Ceiling for the per-attempt timeout; growth saturates here.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// What the network dispatcher should do after a failed attempt.
#[derive(Debug)]
pub enum RetryDecision {
    /// Budget left: attempt again with the policy's new timeout.
    Retry,
    /// Budget spent: deliver this error as final.
    Exhausted(RequestError),
}

/// Per-request retry state. Mutated only by [`prepare_next_attempt`].
///
/// [`prepare_next_attempt`]: RetryPolicy::prepare_next_attempt
pub trait RetryPolicy: Send + std::fmt::Debug {
    /// Timeout the transport should apply to the next attempt.
    fn current_timeout(&self) -> Duration;

    /// Number of retries performed so far.
    fn current_retry_count(&self) -> u32;

    /// Account for a failed attempt and decide whether to try again.
    fn prepare_next_attempt(&mut self, error: RequestError) -> RetryDecision;
}

/// Retry configuration shared by every [`DefaultRetryPolicy`] built from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub initial_timeout: Duration,
    pub max_retries: u32,
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// Multiplicative backoff with a fixed retry budget.
///
/// Each failed attempt grows the timeout by `timeout * backoff_multiplier`
/// and bumps the retry count; a retry is permitted while the count stays
/// within `max_retries`.
#[derive(Debug, Clone)]
pub struct DefaultRetryPolicy {
    current_timeout: Duration,
    current_retry_count: u32,
    max_retries: u32,
    backoff_multiplier: f32,
}

impl DefaultRetryPolicy {
    pub fn new(initial_timeout: Duration, max_retries: u32, backoff_multiplier: f32) -> Self {
        Self {
            current_timeout: initial_timeout,
            current_retry_count: 0,
            max_retries,
            backoff_multiplier: backoff_multiplier.max(0.0),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.initial_timeout, config.max_retries, config.backoff_multiplier)
    }

    pub fn backoff_multiplier(&self) -> f32 {
        self.backoff_multiplier
    }

    fn has_attempt_remaining(&self) -> bool {
        self.current_retry_count <= self.max_retries
    }
}

/// `timeout + timeout * multiplier`, saturating at [`MAX_TIMEOUT`].
fn grown_timeout(timeout: Duration, multiplier: f32) -> Duration {
    let secs = timeout.as_secs_f64() * (1.0 + f64::from(multiplier));
    Duration::try_from_secs_f64(secs).map_or(MAX_TIMEOUT, |grown| grown.min(MAX_TIMEOUT))
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn current_timeout(&self) -> Duration {
        self.current_timeout
    }

    fn current_retry_count(&self) -> u32 {
        self.current_retry_count
    }

    fn prepare_next_attempt(&mut self, error: RequestError) -> RetryDecision {
        self.current_retry_count = self.current_retry_count.saturating_add(1);
        self.current_timeout = grown_timeout(self.current_timeout, self.backoff_multiplier);
        if self.has_attempt_remaining() {
            RetryDecision::Retry
        } else {
            RetryDecision::Exhausted(error)
        }
    }
}
