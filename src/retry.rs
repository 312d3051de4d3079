//! Bounded retry of fallible device operations.

use crate::error::{Result, SwitchError};
use log::debug;
use std::future::Future;
use tokio::time::{Duration, sleep};

const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// How an operation under a [`RetryPolicy`] ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded.
    Succeeded { value: T, attempts: usize },
    /// An attempt failed with a non-transient error; no retry was made.
    Failed(SwitchError),
    /// Every attempt failed with a transient error.
    Exhausted {
        attempts: usize,
        last_error: SwitchError,
    },
}

/// Number of attempts and the pause between them.
///
/// The policy only counts; reacting to an exhausted outcome (dropping a stale
/// address, for instance) is left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// A policy making at most `max_attempts` attempts (at least one).
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Runs `op` until it succeeds, fails permanently or runs out of attempts.
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    };
                }
                Err(e) if !e.is_transient() => return RetryOutcome::Failed(e),
                Err(e) if attempt >= max_attempts => {
                    return RetryOutcome::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    };
                }
                Err(e) => {
                    debug!("Attempt {}/{} failed: {}", attempt, max_attempts, e);
                    if !self.delay.is_zero() {
                        sleep(self.delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let outcome = RetryPolicy::default()
            .run(|attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err(SwitchError::Timeout)
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert!(matches!(
            outcome,
            RetryOutcome::Succeeded {
                value: 3,
                attempts: 3
            }
        ));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = Cell::new(0);
        let outcome: RetryOutcome<()> = RetryPolicy::new(4)
            .run(|_| {
                calls.set(calls.get() + 1);
                async { Err(SwitchError::Io("connection reset".into())) }
            })
            .await;
        match outcome {
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert!(matches!(last_error, SwitchError::Io(_)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let outcome: RetryOutcome<()> = RetryPolicy::default()
            .run(|_| {
                calls.set(calls.get() + 1);
                async { Err(SwitchError::InvalidPayload) }
            })
            .await;
        assert!(matches!(
            outcome,
            RetryOutcome::Failed(SwitchError::InvalidPayload)
        ));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_attempts() {
        let start = tokio::time::Instant::now();
        let _: RetryOutcome<()> = RetryPolicy::new(3)
            .with_delay(Duration::from_millis(500))
            .run(|_| async { Err(SwitchError::Timeout) })
            .await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
    }
}
