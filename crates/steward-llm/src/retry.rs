use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

/// Substrings that mark a failure as rate limiting when the error is not
/// already the typed `RateLimited` variant.
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "429", "quota", "throttle"];

/// Bounded exponential backoff around any model call.
///
/// The policy is independent of the call site: it runs a re-invocable async
/// thunk and re-raises the last error unchanged once attempts are exhausted.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_factor,
        }
    }

    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay
            .mul_f64(self.backoff_factor.powi(i32::try_from(attempt).unwrap_or(i32::MAX)))
    }

    /// Run `op`, retrying on failure with the configured backoff schedule.
    ///
    /// Rate-limit failures and generic failures share the same schedule and
    /// differ only in the diagnostic logged between attempts. A
    /// `ToolHistoryRejected` failure is never retried: repeating the same
    /// payload cannot help; the caller must change the request first.
    ///
    /// # Errors
    ///
    /// Returns the last error unchanged after `max_attempts` failures.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if matches!(err, LlmError::ToolHistoryRejected { .. }) {
                        return Err(err);
                    }
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1);
                    if is_rate_limit(&err) {
                        tracing::warn!(
                            "rate limited, retrying in {:.1}s ({attempt}/{})",
                            delay.as_secs_f64(),
                            self.max_attempts
                        );
                    } else {
                        tracing::warn!(
                            "model call failed: {err}, retrying in {:.1}s ({attempt}/{})",
                            delay.as_secs_f64(),
                            self.max_attempts
                        );
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn is_rate_limit(err: &LlmError) -> bool {
    if matches!(err, LlmError::RateLimited) {
        return true;
    }
    let text = err.to_string().to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| text.contains(m))
}
