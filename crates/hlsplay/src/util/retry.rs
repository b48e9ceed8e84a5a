use std::{future::Future, time::Duration};

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{HlsError, HlsResult};

/// Exponential backoff used for transport failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to `base_delay / 2` of random delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter {
            return delay;
        }

        let jitter_limit = (self.base_delay / 2).min(self.max_delay.saturating_sub(delay));
        let jitter_limit = jitter_limit.as_millis() as u64;
        if jitter_limit == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_limit))
    }
}

/// Run `operation` until it succeeds, fails permanently, runs out of retries, or
/// `token` is cancelled.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut operation: F,
) -> HlsResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = HlsResult<T>>,
{
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(HlsError::Stopped);
        }

        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !error.is_transient() || attempt >= policy.max_retries {
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt);
        attempt += 1;
        log::warn!(
            "Request failed, retrying in {delay:?} ({attempt} / {}). {error}",
            policy.max_retries
        );
        tokio::select! {
            _ = token.cancelled() => return Err(HlsError::Stopped),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
