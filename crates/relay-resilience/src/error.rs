//! Error wrappers produced by the resilience components.
//!
//! All three types are generic over the caller's error so the original
//! failure is never lost.

use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::classify::{ErrorClass, ErrorClassifier};

/// Error returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call).
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitError<E> {
    /// The breaker is open and the operation was not invoked.
    Open {
        /// Name of the breaker that rejected the call.
        breaker: String,
        /// Failures that tripped the breaker.
        failure_count: u32,
        /// Time left until the breaker admits a probe.
        remaining: Duration,
    },
    /// The operation ran and failed.
    Inner(E),
}

impl<E> CircuitError<E> {
    /// Returns true if the call was rejected without running.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns the operation's own error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open { .. } => None,
        }
    }

    /// Returns a reference to the operation's own error, if it ran.
    #[must_use]
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CircuitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open {
                breaker,
                failure_count,
                remaining,
            } => write!(
                f,
                "circuit '{breaker}' is open after {failure_count} failures, retry in {}ms",
                remaining.as_millis()
            ),
            Self::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E> std::error::Error for CircuitError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open { .. } => None,
        }
    }
}

impl<E: ErrorClassifier> ErrorClassifier for CircuitError<E> {
    fn classify(&self) -> ErrorClass {
        match self {
            Self::Open { .. } => ErrorClass::Permanent,
            Self::Inner(e) => e.classify(),
        }
    }

    fn was_attempted(&self) -> bool {
        !self.is_open()
    }
}

/// Error returned when [`RetryHandler`](crate::RetryHandler) gives up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    /// Attempts actually made, including the first.
    pub attempts: u32,
    /// Error from the last attempt.
    pub error: E,
    /// True if shutdown interrupted a backoff sleep.
    pub cancelled: bool,
}

impl<E> RetryFailure<E> {
    /// Discards the attempt bookkeeping.
    pub fn into_error(self) -> E {
        self.error
    }
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            write!(
                f,
                "retry cancelled after {} attempt(s): {}",
                self.attempts, self.error
            )
        } else {
            write!(
                f,
                "gave up after {} attempt(s): {}",
                self.attempts, self.error
            )
        }
    }
}

impl<E> std::error::Error for RetryFailure<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Error returned by [`DeadLetterQueue::replay`](crate::DeadLetterQueue::replay).
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayError<E> {
    /// No entry with this id is queued.
    NotFound(Uuid),
    /// The replay handler failed; the entry stays queued.
    Handler(E),
}

impl<E: fmt::Display> fmt::Display for ReplayError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "dead letter {id} not found"),
            Self::Handler(e) => write!(f, "replay failed: {e}"),
        }
    }
}

impl<E> std::error::Error for ReplayError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Handler(e) => Some(e),
            Self::NotFound(_) => None,
        }
    }
}
