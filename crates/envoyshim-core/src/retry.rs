use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::errors::Retryable;

/// Retry with a fixed, ordered list of delays: attempt `n` failing with a
/// retryable error sleeps `delays[n-1]` before attempt `n+1`. The number
/// of attempts equals the number of delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(&[100, 500, 1000, 1500])
    }
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_millis(millis: &[u64]) -> Self {
        Self::new(millis.iter().copied().map(Duration::from_millis).collect())
    }

    /// Always at least one attempt, even with no delays configured.
    pub fn max_attempts(&self) -> usize {
        self.delays.len().max(1)
    }

    pub fn backoff_duration(&self, attempt: usize) -> Duration {
        attempt
            .checked_sub(1)
            .and_then(|i| self.delays.get(i))
            .copied()
            .unwrap_or_default()
    }

    pub fn should_retry<E: Retryable>(&self, attempt: usize, error: &E) -> bool {
        attempt < self.max_attempts() && error.is_retryable()
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if self.should_retry(attempt, &e) => {
                    let delay = self.backoff_duration(attempt);
                    tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
