//! Retry Policy
//!
//! One reusable object parameterized by attempt budget, exponential backoff
//! and a retryable-error predicate. Call sites never hand-roll retry loops.

use crate::cancel::CancellationToken;
use crate::config::RetryConfig;
use crate::model::FailureReason;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Exponential backoff with a cap and optional jitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay after the first failed attempt
    pub initial: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Cap on any single delay
    pub max: Duration,
    /// Relative jitter in [0, 1]
    pub jitter: f64,
}

impl Backoff {
    /// Delay to wait after `attempt` (1-based) failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max.as_secs_f64());
        let jittered = if self.jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            (capped * (1.0 + spread)).min(self.max.as_secs_f64())
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

type Predicate = Arc<dyn Fn(&FailureReason) -> bool + Send + Sync>;

/// Result of running an operation under a retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    /// Final value, or the reason of the last failed attempt
    pub result: Result<T, FailureReason>,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// Bounded retry with backoff
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    retryable: Predicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Policy retrying every reason that [`FailureReason::is_retryable`] accepts
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retryable: Arc::new(FailureReason::is_retryable),
        }
    }

    /// Build from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Backoff {
                initial: config.initial_backoff,
                multiplier: config.backoff_multiplier,
                max: config.max_backoff,
                jitter: config.jitter,
            },
        )
    }

    /// Replace the retryable-error predicate. Cancellation is never retried.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FailureReason) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    /// Attempt budget
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff schedule
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Whether a failure on `attempt` (1-based) should be followed by another attempt
    pub fn should_retry(&self, attempt: u32, reason: &FailureReason) -> bool {
        attempt < self.max_attempts
            && *reason != FailureReason::Cancelled
            && (self.retryable)(reason)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// `op` receives the 1-based attempt number. Backoff sleeps end early when
    /// `cancel` fires, in which case the outcome is [`FailureReason::Cancelled`].
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FailureReason>>,
    {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return RetryOutcome {
                    result: Err(FailureReason::Cancelled),
                    attempts: attempt - 1,
                };
            }

            match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(reason) if self.should_retry(attempt, &reason) => {
                    let delay = self.backoff.delay_for(attempt);
                    debug!(attempt, ?delay, %reason, "retrying after backoff");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return RetryOutcome {
                                result: Err(FailureReason::Cancelled),
                                attempts: attempt,
                            };
                        }
                    }
                    attempt += 1;
                }
                Err(reason) => {
                    return RetryOutcome {
                        result: Err(reason),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn backoff() -> Backoff {
        Backoff {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_millis(350),
            jitter: 0.0,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let b = backoff();
        assert_eq!(b.delay_for(1), Duration::from_millis(100));
        assert_eq!(b.delay_for(2), Duration::from_millis(200));
        assert_eq!(b.delay_for(3), Duration::from_millis(350));
        assert_eq!(b.delay_for(30), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let b = Backoff {
            jitter: 0.5,
            ..backoff()
        };
        for attempt in 1..10 {
            let d = b.delay_for(attempt);
            assert!(d <= Duration::from_millis(350));
            assert!(d >= Duration::from_millis(50));
        }
    }

    #[test]
    fn test_should_retry_respects_budget_and_predicate() {
        let policy = RetryPolicy::new(3, backoff());
        assert!(policy.should_retry(1, &FailureReason::Timeout));
        assert!(policy.should_retry(2, &FailureReason::Timeout));
        assert!(!policy.should_retry(3, &FailureReason::Timeout));
        assert!(!policy.should_retry(1, &FailureReason::InvalidInput("x".into())));

        let only_timeouts =
            RetryPolicy::new(3, backoff()).with_predicate(|r| *r == FailureReason::Timeout);
        assert!(!only_timeouts.should_retry(1, &FailureReason::ExecutionFailure("x".into())));
        assert!(!only_timeouts.should_retry(1, &FailureReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_until_success() {
        let policy = RetryPolicy::new(3, backoff());
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();

        let outcome = policy
            .run(&token, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(FailureReason::Timeout)
                    } else {
                        Ok(attempt * 10)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result, Ok(30));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_permanent_failure() {
        let policy = RetryPolicy::new(5, backoff());
        let token = CancellationToken::new();
        let outcome: RetryOutcome<()> = policy
            .run(&token, |_| async {
                Err(FailureReason::InvalidInput("bad scale".into()))
            })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(FailureReason::InvalidInput(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_gives_up_after_budget() {
        let policy = RetryPolicy::new(2, backoff());
        let token = CancellationToken::new();
        let outcome: RetryOutcome<()> = policy
            .run(&token, |_| async { Err(FailureReason::Timeout) })
            .await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result, Err(FailureReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let policy = RetryPolicy::new(
            3,
            Backoff {
                initial: Duration::from_secs(60),
                max: Duration::from_secs(60),
                ..backoff()
            },
        );
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel("operator");
        });

        let start = tokio::time::Instant::now();
        let outcome: RetryOutcome<()> = policy
            .run(&token, |_| async { Err(FailureReason::Timeout) })
            .await;
        assert_eq!(outcome.result, Err(FailureReason::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
