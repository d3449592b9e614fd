//! Bounded retry as an explicit state machine.
//!
//! Every retried operation moves through [`AttemptState`]:
//! `Attempting(1) -> Attempting(2) -> ... -> Succeeded | ExhaustedFailed`.
//! The budget and the terminal outcome are plain data, so callers can inspect
//! exactly how many attempts were spent.

use std::future::Future;
use std::time::Duration;

use metricflow_core::config::WorkflowConfig;
use tracing::debug;

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Factor applied to the delay after each further failure.
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Policy for metric computation.
    #[must_use]
    pub fn for_metrics(config: &WorkflowConfig) -> Self {
        Self {
            max_attempts: config.metric_retry_budget,
            initial_delay: config.metric_retry_delay(),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }

    /// Policy for outline generation.
    #[must_use]
    pub fn for_outline(config: &WorkflowConfig) -> Self {
        Self {
            max_attempts: config.outline_retry_budget,
            initial_delay: config.outline_retry_delay(),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
        }
    }

    /// Same schedule with a different attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait after `failed` consecutive failed attempts.
    #[must_use]
    pub fn delay_for(&self, failed: u32) -> Duration {
        if failed == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failed - 1).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay = self.initial_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

/// Position of an operation in its retry lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState<T, E> {
    /// About to run the given 1-based attempt.
    Attempting(u32),
    /// Finished with a value after `attempts` attempts.
    Succeeded {
        /// The produced value.
        value: T,
        /// Attempts spent.
        attempts: u32,
    },
    /// Gave up after `attempts` attempts.
    ExhaustedFailed {
        /// Attempts spent.
        attempts: u32,
        /// Error of the final attempt.
        last_error: E,
        /// Whether the final error was retryable.
        retryable: bool,
    },
}

impl<T, E> AttemptState<T, E> {
    /// Initial state.
    #[must_use]
    pub fn start() -> Self {
        Self::Attempting(1)
    }

    /// Whether no further attempts will be made.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Attempting(_))
    }

    /// Feed the result of the current attempt.
    ///
    /// A retryable failure moves to the next attempt while the budget lasts;
    /// any other failure ends the machine immediately.
    #[must_use]
    pub fn advance(self, result: Result<T, E>, retryable: bool, policy: &RetryPolicy) -> Self {
        let Self::Attempting(attempt) = self else {
            return self;
        };
        match result {
            Ok(value) => Self::Succeeded {
                value,
                attempts: attempt,
            },
            Err(_) if retryable && attempt < policy.max_attempts => Self::Attempting(attempt + 1),
            Err(last_error) => Self::ExhaustedFailed {
                attempts: attempt,
                last_error,
                retryable,
            },
        }
    }
}

/// Drive `operation` through the retry state machine.
///
/// `operation` receives the 1-based attempt number; `is_retryable` decides
/// which errors earn another attempt. Waits between attempts follow `policy`.
/// A zero budget still runs one attempt.
pub async fn run_with_retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut operation: F,
) -> AttemptState<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut state = AttemptState::start();
    while let AttemptState::Attempting(attempt) = state {
        let result = operation(attempt).await;
        let retryable = result.as_ref().err().is_some_and(&is_retryable);
        if let Err(e) = &result {
            debug!(attempt, retryable, "Attempt failed: {}", e);
        }
        state = state.advance(result, retryable, policy);
        if matches!(state, AttemptState::Attempting(_)) {
            let delay = policy.delay_for(attempt);
            if !delay.is_zero() {
                debug!("Waiting {}ms before retry", delay.as_millis());
                tokio::time::sleep(delay).await;
            }
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::ZERO,
            multiplier: 2.0,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_delay_schedule_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_secs(3));
        assert_eq!(policy.delay_for(60), Duration::from_secs(3));
    }

    #[test]
    fn test_state_transitions() {
        let policy = instant(2);
        let state: AttemptState<u32, &str> = AttemptState::start();

        let state = state.advance(Err("reset"), true, &policy);
        assert_eq!(state, AttemptState::Attempting(2));

        let state = state.advance(Err("reset"), true, &policy);
        assert_eq!(
            state,
            AttemptState::ExhaustedFailed {
                attempts: 2,
                last_error: "reset",
                retryable: true
            }
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn test_non_retryable_failure_stops_immediately() {
        let state: AttemptState<u32, &str> =
            AttemptState::start().advance(Err("schema"), false, &instant(5));
        assert!(matches!(
            state,
            AttemptState::ExhaustedFailed { attempts: 1, retryable: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_run_with_retry_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let state = run_with_retry(
            &instant(3),
            |_: &String| true,
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("attempt {attempt} failed"))
                    } else {
                        Ok(attempt * 10)
                    }
                }
            },
        )
        .await;

        assert_eq!(
            state,
            AttemptState::Succeeded {
                value: 30,
                attempts: 3
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_budget_runs_once() {
        let state: AttemptState<(), String> =
            run_with_retry(&instant(0), |_| true, |_| async { Err("down".to_string()) }).await;
        assert!(matches!(state, AttemptState::ExhaustedFailed { attempts: 1, .. }));
    }
}
