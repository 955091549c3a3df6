//! Retry with exponential backoff for upstream calls
//!
//! Only responses with a retryable status are retried. Failures that never
//! produced a response (DNS, refused connection, timeout) are returned after a
//! single attempt.

use std::future::Future;
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::config::RetryConfig;
use crate::error::ApiError;

/// Statuses worth another attempt
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Attempt ceiling and backoff parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the uniform random jitter added to every delay
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Whether an error may be retried. Errors without a status never are.
    pub fn is_retryable(err: &ApiError) -> bool {
        err.status()
            .is_some_and(|status| RETRYABLE_STATUSES.contains(&status))
    }

    /// Delay before the retry that follows zero-based `attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.exponential_delay(attempt) + Duration::from_millis(jitter)
    }

    /// `base_delay * 2^attempt`, saturating
    fn exponential_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt ceiling is reached. The last error is returned on exhaustion.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !RetryPolicy::is_retryable(&err) {
            return Err(err);
        }

        if attempt + 1 >= policy.max_attempts {
            warn!(
                "{} failed after {} attempts: {}",
                label, policy.max_attempts, err
            );
            return Err(err);
        }

        let delay = policy.backoff_delay(attempt);
        warn!(
            "{} failed with HTTP {} (attempt {}/{}), retrying in {:?}",
            label,
            err.status().unwrap_or_default(),
            attempt + 1,
            policy.max_attempts,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
