//! Bounded retry with exponential backoff for remote calls.
//!
//! The catalog client and the asset downloader never retry on their own; the
//! sync engine wraps each call with [`RetryPolicy::run`], which only retries
//! errors that [`ArchiveError::is_retryable`] accepts.

use crate::config::NetworkConfig;
use crate::error::ArchiveError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NetworkConfig::MAX_ATTEMPTS,
            base_delay: NetworkConfig::RETRY_BASE_DELAY,
            max_delay: NetworkConfig::RETRY_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Retries with no waiting, for tests and offline runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Calculate the delay before retry number `attempt` (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2f64.powi(attempt as i32);
        let capped_secs =
            (self.base_delay.as_secs_f64() * multiplier).min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter && capped_secs > 0.0 {
            // Scale by 0.5..1.5 so the mean stays put but retries spread out.
            let factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. Returns the final result and the attempts made.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> (Result<T, ArchiveError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ArchiveError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded after {} attempts", label, attempt + 1);
                    }
                    return (Ok(value), attempt + 1);
                }
                Err(e) if !e.is_retryable() => return (Err(e), attempt + 1),
                Err(e) if attempt + 1 >= max_attempts => {
                    warn!(
                        "{}: all {} attempts failed. Last error: {}",
                        label, max_attempts, e
                    );
                    return (Err(e), attempt + 1);
                }
                Err(e) => {
                    let delay = self.calculate_delay(attempt);
                    warn!(
                        "{}: attempt {}/{} failed: {}. Retrying in {:?}",
                        label,
                        attempt + 1,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
