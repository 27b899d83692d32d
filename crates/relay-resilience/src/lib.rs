//! # Relay Resilience
//!
//! Failure-handling building blocks for the relay delivery layer.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`CircuitBreaker`] | Rejects calls to an unhealthy dependency until a cool-down elapses |
//! | [`RetryHandler`] | Re-runs transient failures with capped exponential backoff and jitter |
//! | [`DeadLetterQueue`] | Keeps messages that could not be delivered for inspection and replay |
//! | [`ErrorClassifier`] | Splits errors into transient and permanent |
//!
//! ## How They Compose
//!
//! ```text
//! ┌──────────┐   call    ┌────────────────┐  error   ┌──────────────┐
//! │ message  │ ────────► │ CircuitBreaker │ ───────► │ RetryHandler │
//! └──────────┘           └────────────────┘          └──────────────┘
//!                               │ open                      │ exhausted
//!                               ▼                           ▼
//!                        ┌──────────────────────────────────────┐
//!                        │           DeadLetterQueue            │
//!                        └──────────────────────────────────────┘
//! ```
//!
//! Each component is usable on its own and is safe to share across tasks
//! behind an `Arc`. None of them hold a lock across an `.await`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod circuit_breaker;
pub mod classify;
pub mod dead_letter;
pub mod error;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats};
pub use classify::{ErrorClass, ErrorClassifier};
pub use dead_letter::{
    DeadLetterEntry, DeadLetterQueue, DeadLetterReason, DeadLetterStats,
};
pub use error::{CircuitError, ReplayError, RetryFailure};
pub use retry::{RetryConfig, RetryHandler, RetryStats, RetryableMessage};
