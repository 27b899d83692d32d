//! Retry with capped exponential backoff and jitter.
//!
//! ```text
//! delay(n) = min(base_delay * exponential_base^n, max_delay)
//! sleep(n) = delay(n) +/- jitter_factor * delay(n)
//! ```
//!
//! `n` is the zero-based index of the attempt that just failed. Only errors
//! classified as [`ErrorClass::Transient`](crate::ErrorClass) are retried,
//! and never more than `max_attempts` attempts are made in total.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classify::ErrorClassifier;
use crate::error::RetryFailure;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Upper bound on attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Ceiling for any computed delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub exponential_base: f64,
    /// Maximum relative deviation applied by jitter, in `[0, 1]`
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// Unjittered delay after the attempt with zero-based index `attempt`.
    ///
    /// Monotonically non-decreasing in `attempt` and never above `max_delay`.
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = base * self.exponential_base.max(1.0).powi(exponent);

        let capped = if raw.is_finite() { raw.min(max) } else { max };
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Jittered delay for a given uniform `sample` in `[0, 1]`.
    ///
    /// A sample of 0.5 yields the unjittered delay; 0 and 1 yield the lower
    /// and upper bound of the jitter window.
    #[must_use]
    pub fn backoff_with_jitter(&self, attempt: u32, sample: f64) -> Duration {
        let delay = self.calculate_delay(attempt).as_secs_f64();
        let factor = if self.jitter_factor.is_finite() {
            self.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let sample = if sample.is_finite() {
            sample.clamp(0.0, 1.0)
        } else {
            0.5
        };

        let offset = (sample * 2.0 - 1.0) * factor * delay;
        Duration::from_secs_f64((delay + offset).max(0.0))
    }

    fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// A message together with its delivery attempt bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryableMessage {
    /// Subject the message was received on or is published to
    pub subject: String,
    /// Message payload
    pub payload: Value,
    /// Attempts made so far
    pub attempt: u32,
    /// When the first attempt started
    pub first_attempt_time: Instant,
}

impl RetryableMessage {
    /// Wrap a message before its first attempt.
    #[must_use]
    pub fn new(subject: impl Into<String>, payload: Value) -> Self {
        Self {
            subject: subject.into(),
            payload,
            attempt: 0,
            first_attempt_time: Instant::now(),
        }
    }

    /// Time since the first attempt started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.first_attempt_time.elapsed()
    }
}

/// Retry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    /// Retry attempts made (first attempts excluded)
    pub retries: u64,
    /// Operations that succeeded after at least one retry
    pub recovered: u64,
    /// Operations abandoned after a transient failure
    pub exhausted: u64,
}

/// Executes fallible async operations with backoff.
#[derive(Debug, Default)]
pub struct RetryHandler {
    config: RetryConfig,
    retries: AtomicU64,
    recovered: AtomicU64,
    exhausted: AtomicU64,
}

impl RetryHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retries: AtomicU64::new(0),
            recovered: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    /// Handler configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Unjittered delay, see [`RetryConfig::calculate_delay`].
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.config.calculate_delay(attempt)
    }

    /// Jittered delay drawn from the thread-local RNG.
    #[must_use]
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let sample: f64 = rand::thread_rng().gen_range(0.0..=1.0);
        self.config.backoff_with_jitter(attempt, sample)
    }

    /// True if another attempt is allowed for `message` after `error`.
    pub fn should_retry<E: ErrorClassifier>(&self, message: &RetryableMessage, error: &E) -> bool {
        self.may_retry(message.attempt, error)
    }

    fn may_retry<E: ErrorClassifier>(&self, attempts_made: u32, error: &E) -> bool {
        attempts_made < self.config.attempt_limit() && error.is_transient()
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// limit is reached.
    ///
    /// The operation receives the zero-based attempt index. On failure the
    /// returned [`RetryFailure`] carries the last error and the number of
    /// attempts made.
    pub async fn retry_with_backoff<F, Fut, T, E>(
        &self,
        mut operation: F,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorClassifier + fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        self.recovered.fetch_add(1, Ordering::Relaxed);
                        info!(attempts = attempt + 1, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.was_attempted() {
                        return Err(self.give_up(attempt, error));
                    }
                    let attempts = attempt + 1;
                    if !self.may_retry(attempts, &error) {
                        return Err(self.give_up(attempts, error));
                    }

                    let delay = self.calculate_backoff(attempt);
                    debug!(
                        attempt = attempts,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    attempt += 1;
                }
            }
        }
    }

    /// Continue retrying a message whose latest attempt failed with
    /// `last_error`.
    ///
    /// `message.attempt` must already count that failed attempt; it is
    /// advanced for every further attempt that actually ran. An attempt
    /// refused before running (see [`ErrorClassifier::was_attempted`]) ends
    /// the loop uncounted. A `true` on `shutdown` interrupts a pending
    /// backoff sleep and returns a cancelled [`RetryFailure`].
    pub async fn retry_message<F, Fut, T, E>(
        &self,
        message: &mut RetryableMessage,
        last_error: E,
        shutdown: &mut watch::Receiver<bool>,
        mut operation: F,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorClassifier + fmt::Display,
    {
        let mut last_error = last_error;
        loop {
            if !self.should_retry(message, &last_error) {
                return Err(self.give_up(message.attempt, last_error));
            }

            let delay = self.calculate_backoff(message.attempt.saturating_sub(1));
            debug!(
                subject = %message.subject,
                attempt = message.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Scheduling retry"
            );

            tokio::select! {
                biased;
                _ = shutdown_signalled(shutdown) => {
                    debug!(subject = %message.subject, "Retry interrupted by shutdown");
                    return Err(RetryFailure {
                        attempts: message.attempt,
                        error: last_error,
                        cancelled: true,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let attempt = message.attempt;
            self.retries.fetch_add(1, Ordering::Relaxed);

            match operation(attempt).await {
                Ok(value) => {
                    message.attempt += 1;
                    self.recovered.fetch_add(1, Ordering::Relaxed);
                    info!(
                        subject = %message.subject,
                        attempts = message.attempt,
                        "Message succeeded after retry"
                    );
                    return Ok(value);
                }
                Err(error) if error.was_attempted() => {
                    message.attempt += 1;
                    last_error = error;
                }
                Err(error) => return Err(self.give_up(message.attempt, error)),
            }
        }
    }

    fn give_up<E: ErrorClassifier + fmt::Display>(&self, attempts: u32, error: E) -> RetryFailure<E> {
        if error.is_transient() {
            self.exhausted.fetch_add(1, Ordering::Relaxed);
            warn!(attempts, error = %error, "Retries exhausted");
        } else {
            debug!(attempts, error = %error, "Permanent failure, not retrying");
        }
        RetryFailure {
            attempts,
            error,
            cancelled: false,
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> RetryStats {
        RetryStats {
            retries: self.retries.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Resolves once `true` is observed on the channel. Never resolves if the
/// sender is dropped without signalling.
async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow_and_update() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow_and_update() {
            return;
        }
    }
    std::future::pending::<()>().await;
}
