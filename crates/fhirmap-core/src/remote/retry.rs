//! Retry logic with exponential backoff for HTTP requests

use super::error::FetchError;
use backoff::{backoff::Backoff, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Whether to randomize delays
    pub jitter: bool,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: true,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new(0)
    }

    pub fn with_base_delay(mut self, millis: u64) -> Self {
        self.base_delay_ms = millis;
        self
    }

    pub fn with_max_delay(mut self, millis: u64) -> Self {
        self.max_delay_ms = millis;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.base_delay_ms),
            max_interval: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            // attempts are bounded by max_attempts instead
            max_elapsed_time: None,
            ..Default::default()
        };
        if !self.jitter {
            backoff.randomization_factor = 0.0;
        }
        backoff
    }
}

/// Decision on whether to retry a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    NoRetry,
}

/// Tracks attempts and delays for one logical request
#[derive(Debug)]
pub struct RetryHandler {
    policy: RetryPolicy,
    attempts: u32,
    backoff: ExponentialBackoff,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        let backoff = policy.create_backoff();
        Self {
            policy,
            attempts: 0,
            backoff,
        }
    }

    pub fn should_retry(&mut self, error: &FetchError) -> RetryDecision {
        if self.attempts >= self.policy.max_attempts || !error.should_retry() {
            return RetryDecision::NoRetry;
        }
        self.attempts += 1;

        let delay = error.retry_delay().unwrap_or_else(|| {
            self.backoff
                .next_backoff()
                .unwrap_or(Duration::from_millis(self.policy.max_delay_ms))
        });
        RetryDecision::Retry { delay }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Run `request_fn` until it succeeds, fails permanently, or attempts run out
pub async fn execute_with_retry<F, Fut, T>(mut request_fn: F, policy: RetryPolicy) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut handler = RetryHandler::new(policy);

    loop {
        match request_fn().await {
            Ok(response) => return Ok(response),
            Err(error) => match handler.should_retry(&error) {
                RetryDecision::Retry { delay } => {
                    log::warn!(
                        "Request failed (attempt {}), retrying after {:?}: {}",
                        handler.attempts(),
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::NoRetry => {
                    log::error!(
                        "Request failed after {} retries, giving up: {}",
                        handler.attempts(),
                        error
                    );
                    return Err(error);
                }
            },
        }
    }
}
