//! Bounded exponential back-off for endpoint discovery.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sk_domain::config::SessionConfig;
use sk_domain::error::{Error, Result};
use sk_domain::trace::{millis, TraceEvent};

/// How often, and how patiently, discovery is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self::new(cfg.max_retries, cfg.retry_delay())
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before attempt `attempt` (0-indexed): zero for the first,
    /// then `base_delay * 2^(attempt - 1)`, saturating.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// the policy runs out of attempts.
///
/// `operation` receives the 0-indexed attempt number. Exhaustion yields
/// [`Error::DiscoveryFailed`] wrapping the last cause. Cancelling `cancel`
/// interrupts the back-off sleep.
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts();
    let mut last_err: Option<Error> = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = policy.delay_before_attempt(attempt);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled("retry interrupted".into()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let retry_in = (attempt + 1 < attempts)
                    .then(|| policy.delay_before_attempt(attempt + 1));

                TraceEvent::DiscoveryAttempt {
                    attempt: attempt + 1,
                    max_attempts: attempts,
                    error: Some(e.to_string()),
                    retry_in_ms: retry_in.map(millis),
                }
                .emit();

                match retry_in {
                    Some(delay) => tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        retry_in_ms = millis(delay),
                        error = %e,
                        "discovery attempt failed, retrying"
                    ),
                    None => tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "discovery attempt failed, giving up"
                    ),
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::DiscoveryFailed {
        attempts,
        source: Box::new(
            last_err.unwrap_or_else(|| Error::Connection("no attempt was made".into())),
        ),
    })
}
