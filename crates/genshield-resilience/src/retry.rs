// SPDX-FileCopyrightText: 2026 GenShield Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential-backoff retry around fallible async operations.

use std::future::Future;
use std::time::Duration;

use genshield_core::ShieldError;
use rand::Rng;
use tracing::{debug, warn};

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ShieldError {
    fn is_retryable(&self) -> bool {
        ShieldError::is_retryable(self)
    }
}

/// Backoff schedule: `base * multiplier^(i-1)` before retry `i`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Draw each delay uniformly from `[delay/2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

/// What a retried operation produced and how many calls it took.
#[derive(Debug)]
pub struct RetryOutcome<T, E = ShieldError> {
    pub result: Result<T, E>,
    /// Calls made, including the first.
    pub attempts: u32,
    /// Time spent sleeping between calls.
    pub total_delay: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Calls made after the first.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

impl RetryPolicy {
    pub fn from_config(config: &genshield_config::model::RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }

    /// Same schedule with a different attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exp = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    fn sleep_for(&self, retry: u32) -> Duration {
        let delay = self.delay_for(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let ms = delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(ms / 2..=ms))
    }

    /// Run `op` under this policy's attempt budget.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> RetryOutcome<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_retry(op, self.max_attempts).await
    }

    /// Run `op` up to `max_attempts` times.
    ///
    /// The closure receives the 1-based attempt number. A non-retryable error
    /// stops immediately; after the last attempt the final error is returned
    /// unchanged.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        mut op: F,
        max_attempts: u32,
    ) -> RetryOutcome<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut total_delay = Duration::ZERO;
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        total_delay,
                    };
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.sleep_for(attempt);
                    warn!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %e, "transient error, will retry");
                    tokio::time::sleep(delay).await;
                    total_delay += delay;
                    attempt += 1;
                }
                Err(e) => {
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                        total_delay,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(8000));
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let d = policy.sleep_for(2);
            assert!(d >= Duration::from_millis(1000) && d <= Duration::from_millis(2000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let outcome = fast()
            .execute(move |_| {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ShieldError::network("connection reset"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.retries(), 2);
        assert_eq!(outcome.result.unwrap(), "done");
        assert_eq!(outcome.total_delay, Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_after_one_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let outcome: RetryOutcome<(), ShieldError> = fast()
            .execute(move |_| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ShieldError::HttpStatus {
                        status: 400,
                        body: "bad prompt".into(),
                    })
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(matches!(
            outcome.result,
            Err(ShieldError::HttpStatus { status: 400, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error_unchanged() {
        let outcome: RetryOutcome<(), ShieldError> = fast()
            .execute_with_retry(
                |attempt| async move { Err(ShieldError::network(format!("failure {attempt}"))) },
                4,
            )
            .await;
        assert_eq!(outcome.attempts, 4);
        match outcome.result {
            Err(ShieldError::Network { message, .. }) => assert_eq!(message, "failure 4"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_still_calls_once() {
        let outcome: RetryOutcome<u8, ShieldError> =
            fast().execute_with_retry(|_| async { Ok(7) }, 0).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.unwrap(), 7);
    }

    #[test]
    fn from_config_copies_schedule() {
        let config = genshield_config::model::RetryConfig::default();
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy, RetryPolicy::default());
    }
}
