use crate::core::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How a live source invocation is bounded and retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total runs = 1 + retries)
    pub retries: usize,
    pub base_delay: Duration,
    /// Upper bound of the random delay added to each backoff
    pub max_jitter: Duration,
    pub per_call_timeout: Duration,
}

impl RetryPolicy {
    pub fn single_attempt(per_call_timeout: Duration) -> Self {
        Self {
            retries: 0,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            per_call_timeout,
        }
    }

    /// Same policy with the per-call bound raised to at least `source_timeout`.
    pub fn covering(&self, source_timeout: Duration) -> Self {
        Self {
            per_call_timeout: self.per_call_timeout.max(source_timeout),
            ..*self
        }
    }

    pub fn attempts(&self) -> usize {
        self.retries + 1
    }

    /// `base_delay × 2^attempt` plus jitter, for the zero-based failed attempt.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(16);
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.base_delay.saturating_mul(factor) + jitter
    }
}

/// Retries an async source call with exponential backoff.
///
/// An attempt fails when it yields `None` or runs past the per-call timeout;
/// the timed-out future is dropped, which cancels its request. Returns the
/// failure of the last attempt once all attempts are used.
pub async fn with_backoff<F, Fut, T>(
    mut operation: F,
    policy: &RetryPolicy,
    label: &str,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut attempt = 0;
    loop {
        let err = match tokio::time::timeout(policy.per_call_timeout, operation()).await {
            Ok(Some(val)) => return Ok(val),
            Ok(None) => FetchError::NoData(label.to_string()),
            Err(_) => FetchError::Timeout(policy.per_call_timeout),
        };

        if attempt >= policy.retries {
            return Err(err);
        }

        let delay = policy.backoff_delay(attempt);
        debug!(
            "Attempt {}/{} of {} failed: {}. Retrying in {:?}...",
            attempt + 1,
            policy.attempts(),
            label,
            err,
            delay
        );
        attempt += 1;
        tokio::time::sleep(delay).await;
    }
}
