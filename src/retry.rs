//! Generic retry with exponential backoff and jitter.
//!
//! Knows nothing about files or storage: it runs an async operation up to
//! `max_attempts` times, asking the caller's predicate whether each failure is
//! worth another try.

use crate::upload_error::{ErrorKind, UploadError};
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Fraction of the delay used as the jitter band (±5% after the ±0.5 sample).
pub const JITTER_RATIO: f64 = 0.1;

pub type RetryPredicate = Arc<dyn Fn(&UploadError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub should_retry: RetryPredicate,
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("jitter", &self.jitter)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2_000),
            max_delay: Duration::from_millis(30_000),
            backoff_factor: 2.0,
            jitter: true,
            should_retry: Arc::new(default_should_retry),
        }
    }
}

impl RetryOptions {
    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&UploadError) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// `min(base * factor^(attempt-1), max)` in milliseconds, before jitter.
    pub fn calculate_delay_ms(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.base_delay.as_secs_f64() * 1_000.0;
        let max_ms = self.max_delay.as_secs_f64() * 1_000.0;
        let delay = base_ms * self.backoff_factor.powi(exponent);

        if delay.is_nan() {
            return max_ms;
        }
        // A negative factor flips the sign on odd exponents.
        delay.min(max_ms).max(0.0)
    }

    /// Delay to sleep after a failed `attempt`, jittered if enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.calculate_delay_ms(attempt);
        let delay_ms = if self.jitter {
            let sample = rand::thread_rng().gen_range(-0.5..0.5);
            apply_jitter(delay_ms, sample)
        } else {
            delay_ms
        };
        Duration::from_secs_f64(delay_ms / 1_000.0)
    }
}

/// Perturbs `delay_ms` by `delay_ms * JITTER_RATIO * sample`, clamped at zero.
///
/// `sample` is expected in `[-0.5, 0.5)`.
pub fn apply_jitter(delay_ms: f64, sample: f64) -> f64 {
    (delay_ms + delay_ms * JITTER_RATIO * sample).max(0.0)
}

/// Rejects size, auth, permission and unauthenticated failures; retries the rest.
pub fn default_should_retry(error: &UploadError) -> bool {
    if matches!(error.kind(), ErrorKind::Size | ErrorKind::Auth) {
        return false;
    }

    let message = error.message().to_ascii_lowercase();
    !(message.contains("permission")
        || message.contains("unauthenticated")
        || message.contains("unauthorized")
        || message.contains("too large"))
}

/// Read-only view handed to the operation on each attempt.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// 1-based attempt number
    pub attempt: u32,
    pub last_error: Option<UploadError>,
    /// Time since the first attempt started
    pub elapsed: Duration,
    /// Delay that will be slept if this attempt fails and is retried
    pub next_delay: Duration,
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `options.max_attempts` is used up. The first success wins.
pub async fn retry_with_backoff<T, F, Fut>(
    mut operation: F,
    options: &RetryOptions,
) -> Result<T, UploadError>
where
    F: FnMut(RetryContext) -> Fut,
    Fut: Future<Output = Result<T, UploadError>>,
{
    let max_attempts = options.max_attempts.max(1);
    let started = Instant::now();
    let mut last_error: Option<UploadError> = None;
    let mut attempt = 1;

    loop {
        let next_delay = options.delay_for_attempt(attempt);
        let ctx = RetryContext {
            attempt,
            last_error: last_error.take(),
            elapsed: started.elapsed(),
            next_delay,
        };

        match operation(ctx).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if attempt >= max_attempts {
                    warn!(
                        attempt,
                        kind = %error.kind(),
                        error = %error,
                        "Retry budget exhausted"
                    );
                    return Err(error);
                }

                if !(options.should_retry)(&error) {
                    debug!(attempt, kind = %error.kind(), "Error is not retryable");
                    return Err(error);
                }

                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = next_delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, backing off"
                );

                tokio::time::sleep(next_delay).await;
                last_error = Some(error);
                attempt += 1;
            }
        }
    }
}
