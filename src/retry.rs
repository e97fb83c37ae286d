use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a retried operation ultimately gave up.
#[derive(Error, Debug, PartialEq)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error
    #[error("retries exhausted: {0}")]
    Exhausted(E),

    /// The cancellation token fired between attempts
    #[error("operation cancelled")]
    Cancelled,
}

/// Explicit retry policy: attempt count, backoff curve, and cancellation
/// in one place instead of nested timers scattered through callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential: true,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            exponential: false,
        }
    }

    /// Single attempt, no waiting
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Delay before the given retry (attempt numbering starts at 1; the
    /// first attempt has no delay)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        if !self.exponential {
            return self.base_delay.min(self.max_delay);
        }

        let exponent = (attempt - 2).min(16);
        let factor = 1u64 << exponent;
        self.base_delay
            .saturating_mul(factor as u32)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, attempts run out, or the token fires.
    pub async fn run<T, E, F, Fut>(
        &self,
        token: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts.max(1) {
            let delay = self.delay_for(attempt);
            if !delay.is_zero() {
                debug!("Waiting {:?} before attempt {}", delay, attempt);
                tokio::select! {
                    _ = token.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if token.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        "Attempt {}/{} failed: {}",
                        attempt,
                        self.max_attempts.max(1),
                        err
                    );
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(RetryError::Exhausted(err)),
            None => Err(RetryError::Cancelled),
        }
    }
}
