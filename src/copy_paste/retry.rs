//! Retry orchestrator: exponential backoff + jitter, attempt-counter
//! reset on progress (§4.3).

use rand::Rng;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{Error, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// Fractional jitter bound, e.g. `0.30` for ±30%.
    pub jitter: f64,
}

impl RetryConfig {
    /// Streaming-path default: base delay 100ms (§5).
    pub fn streaming() -> Self {
        RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(5000),
            jitter: 0.30,
        }
    }

    /// Batch-writer-path default: base delay 1000ms (§5).
    pub fn batch_writer() -> Self {
        RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_millis(5000),
            jitter: 0.30,
        }
    }

    /// `delay(attempt) = round(min(base * mult^attempt, maxDelay) * (1 +
    /// uniform(-jitter, +jitter)))` (§4.3).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_secs_f64() * 1000.0;
        let max_ms = self.max_delay.as_secs_f64() * 1000.0;
        let scaled = (base_ms * self.backoff_multiplier.powi(attempt as i32)).min(max_ms);
        let jitter_factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        let jittered_ms = (scaled * jitter_factor).round().max(0.0);
        Duration::from_millis(jittered_ms as u64)
    }
}

/// Outcome of a single attempt handler invocation, as reported back to
/// `execute` by the caller's classification/progress logic.
pub enum AttemptOutcome<T> {
    /// The operation succeeded with this value.
    Success(T),
    /// The operation failed; `made_progress` resets the attempt counter
    /// to zero when true (§4.3).
    Retryable { error: Error, made_progress: bool },
    /// Conflict/Validator/Other: re-raise immediately, no retry.
    Fatal(Error),
}

/// Executes `attempt` repeatedly under exponential backoff, resetting the
/// attempt counter whenever the handler reports progress. `attempt` is
/// given the current 0-based attempt index.
pub async fn execute<T, F, Fut>(
    config: &RetryConfig,
    cancel: &mut CancelToken,
    mut attempt_fn: F,
) -> crate::error::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = AttemptOutcome<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match attempt_fn(attempt).await {
            AttemptOutcome::Success(value) => return Ok(value),
            AttemptOutcome::Fatal(error) => return Err(error),
            AttemptOutcome::Retryable { error, made_progress } => {
                if made_progress {
                    attempt = 0;
                } else {
                    attempt += 1;
                }
                if attempt > config.max_attempts {
                    return Err(error_or_max_attempts(error, config.max_attempts));
                }
                sleep_cancellable(config.delay_for_attempt(attempt), cancel).await;
                if cancel.is_cancelled() {
                    return Err(error);
                }
            }
        }
    }
}

fn error_or_max_attempts(last: Error, attempts: u32) -> Error {
    let _ = last;
    Error::MaxAttempts { attempts }
}

/// Sleeps for `duration`, resolving early (not erroring) if `cancel`
/// fires mid-sleep (§4.3, §5).
pub async fn sleep_cancellable(duration: Duration, cancel: &mut CancelToken) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = cancel.cancelled() => {}
    }
}

/// Classifies whether a kind is retryable at all (Throttle/Network) vs.
/// fatal-immediately (Conflict/Validator/Other). The writer uses this to
/// decide whether to even enter the retry loop's progress-tracking path.
pub fn is_retryable(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::Throttle | ErrorKind::Network)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_respects_max_delay_cap() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(5000),
            jitter: 0.0,
        };
        let delay = config.delay_for_attempt(10);
        assert_eq!(delay, Duration::from_millis(5000));
    }

    #[test]
    fn delay_jitter_stays_within_bound() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_millis(5000),
            jitter: 0.30,
        };
        for _ in 0..200 {
            let delay = config.delay_for_attempt(0).as_millis() as f64;
            assert!((700.0..=1300.0).contains(&delay), "delay {delay} out of jitter bound");
        }
    }

    #[tokio::test]
    async fn execute_resets_counter_on_progress() {
        let config = RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_millis(1),
            jitter: 0.0,
        };
        let mut cancel = CancelToken::never();
        let mut calls = 0u32;
        let result: crate::error::Result<()> = execute(&config, &mut cancel, |_attempt| {
            calls += 1;
            let call = calls;
            async move {
                if call <= 4 {
                    // Always report progress, so we never exhaust attempts
                    // even though `calls` exceeds `max_attempts`.
                    AttemptOutcome::Retryable {
                        error: Error::OperationError("throttled".into()),
                        made_progress: true,
                    }
                } else {
                    AttemptOutcome::Success(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn execute_raises_max_attempts_without_progress() {
        let config = RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_millis(1),
            jitter: 0.0,
        };
        let mut cancel = CancelToken::never();
        let result: crate::error::Result<()> = execute(&config, &mut cancel, |_attempt| async {
            AttemptOutcome::Retryable {
                error: Error::OperationError("throttled".into()),
                made_progress: false,
            }
        })
        .await;
        assert!(matches!(result, Err(Error::MaxAttempts { attempts: 2 })));
    }

    #[tokio::test]
    async fn execute_does_not_retry_fatal_errors() {
        let config = RetryConfig::streaming();
        let mut cancel = CancelToken::never();
        let mut calls = 0u32;
        let result: crate::error::Result<()> = execute(&config, &mut cancel, |_attempt| {
            calls += 1;
            async { AttemptOutcome::Fatal(Error::Conflict("dup".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
