//! Circuit breaker guarding a single downstream dependency.
//!
//! Prevents a failing broker or processor from being hammered while it is
//! unhealthy. Calls are rejected outright while the breaker is open, and a
//! few probes are let through once the cool-down has elapsed.
//!
//! # Circuit Breaker States
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    CIRCUIT BREAKER STATE MACHINE                    │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │                           any failure                               │
//! │                      ┌─────────────────────┐                        │
//! │                      ▼                     │                        │
//! │      ┌──────────┐          ┌──────────┐          ┌──────────┐       │
//! │      │  CLOSED  │ ───────► │   OPEN   │ ───────► │HALF-OPEN │       │
//! │      │ (normal) │ failures │ (reject) │  timeout │  (probe) │       │
//! │      └──────────┘          └──────────┘          └──────────┘       │
//! │            ▲                                           │            │
//! │            └───────────────────────────────────────────┘            │
//! │                     success_threshold successes                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transitions are evaluated lazily on each call; there is no background
//! timer. The cool-down is measured on the tokio clock, so tests can drive
//! it with `tokio::time::advance`.
//!
//! # Configuration
//!
//! - `failure_threshold`: consecutive failures before opening (default: 5)
//! - `success_threshold`: consecutive half-open successes before closing (default: 3)
//! - `timeout`: time spent open before probing (default: 30s)

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CircuitError;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Calls are rejected immediately
    Open,
    /// Probing whether the dependency recovered
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used by the `relay_circuit_state` gauge.
    #[must_use]
    pub const fn as_gauge(&self) -> i64 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED before opening
    pub failure_threshold: u32,
    /// Consecutive successes in HALF-OPEN before closing
    pub success_threshold: u32,
    /// Time spent OPEN before a probe is admitted
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a config from its three thresholds.
    #[must_use]
    pub fn new(failure_threshold: u32, success_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            timeout,
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    /// Consecutive failures; zero whenever `success_count` is non-zero.
    failure_count: u32,
    /// Consecutive half-open successes.
    success_count: u32,
    last_failure_time: Option<Instant>,
    last_state_change: Instant,
    total_calls: u64,
    total_failures: u64,
    total_successes: u64,
    total_rejections: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_state_change: Instant::now(),
            total_calls: 0,
            total_failures: 0,
            total_successes: 0,
            total_rejections: 0,
        }
    }
}

/// Three-state circuit breaker.
///
/// Share it behind an `Arc`; all methods take `&self`.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.get_state())
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create an unnamed breaker.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::named("default", config)
    }

    /// Create a breaker whose name appears in logs, errors and metrics.
    #[must_use]
    pub fn named(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    /// Breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// While OPEN and inside the cool-down the operation is not invoked and
    /// [`CircuitError::Open`] is returned. Otherwise the operation runs and
    /// its outcome updates the breaker. The internal lock is released while
    /// the operation is awaited.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire()?;

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Admission check. Moves OPEN to HALF-OPEN once the cool-down elapsed.
    fn try_acquire<E>(&self) -> Result<(), CircuitError<E>> {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;

        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner.last_state_change.elapsed();
        if elapsed >= self.config.timeout {
            info!(
                breaker = %self.name,
                open_for_ms = elapsed.as_millis() as u64,
                "Circuit breaker transitioning to half-open"
            );
            self.transition(&mut inner, CircuitState::HalfOpen);
            return Ok(());
        }

        inner.total_rejections += 1;
        let remaining = self.config.timeout - elapsed;
        debug!(
            breaker = %self.name,
            remaining_ms = remaining.as_millis() as u64,
            "Circuit breaker is open, rejecting call"
        );
        Err(CircuitError::Open {
            breaker: self.name.clone(),
            failure_count: inner.failure_count,
            remaining,
        })
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_successes += 1;
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    info!(
                        breaker = %self.name,
                        successes = inner.success_count,
                        "Circuit breaker closing after successful probes"
                    );
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            // Admitted before the breaker opened; the cool-down stands.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.total_failures += 1;
        inner.last_failure_time = Some(now);

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        timeout_secs = self.config.timeout.as_secs(),
                        "Circuit breaker opening due to failures"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "Circuit breaker reopening after probe failure");
                inner.failure_count += 1;
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        if inner.state == to {
            return;
        }
        debug!(breaker = %self.name, from = %inner.state, to = %to, "Circuit state change");
        inner.state = to;
        inner.last_state_change = Instant::now();
        match to {
            CircuitState::Closed | CircuitState::HalfOpen => {
                inner.failure_count = 0;
                inner.success_count = 0;
            }
            CircuitState::Open => {
                inner.success_count = 0;
            }
        }
    }

    /// Current state. Does not evaluate the cool-down.
    #[must_use]
    pub fn get_state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of counters and timings.
    #[must_use]
    pub fn get_stats(&self) -> CircuitStats {
        let inner = self.inner.lock();
        CircuitStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            timeout_ms: self.config.timeout.as_millis() as u64,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            total_rejections: inner.total_rejections,
            last_failure_ms_ago: inner
                .last_failure_time
                .map(|t| t.elapsed().as_millis() as u64),
            time_in_state_ms: inner.last_state_change.elapsed().as_millis() as u64,
        }
    }

    /// Force the breaker back to CLOSED with cleared counters (for admin purposes)
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        info!(breaker = %self.name, "Circuit breaker manually reset");
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure_time = None;
        inner.last_state_change = Instant::now();
    }
}

/// Statistics for a circuit breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitStats {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures
    pub failure_count: u32,
    /// Consecutive half-open successes
    pub success_count: u32,
    /// Configured failure threshold
    pub failure_threshold: u32,
    /// Configured success threshold
    pub success_threshold: u32,
    /// Configured cool-down in milliseconds
    pub timeout_ms: u64,
    /// Calls attempted, including rejected ones
    pub total_calls: u64,
    /// Calls that ran and failed
    pub total_failures: u64,
    /// Calls that ran and succeeded
    pub total_successes: u64,
    /// Calls rejected while open
    pub total_rejections: u64,
    /// Milliseconds since the last failure, if any
    pub last_failure_ms_ago: Option<u64>,
    /// Milliseconds since the last state change
    pub time_in_state_ms: u64,
}

impl serde::Serialize for CircuitStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("CircuitStats", 13)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("state", &self.state.to_string())?;
        state.serialize_field("failure_count", &self.failure_count)?;
        state.serialize_field("success_count", &self.success_count)?;
        state.serialize_field("failure_threshold", &self.failure_threshold)?;
        state.serialize_field("success_threshold", &self.success_threshold)?;
        state.serialize_field("timeout_ms", &self.timeout_ms)?;
        state.serialize_field("total_calls", &self.total_calls)?;
        state.serialize_field("total_failures", &self.total_failures)?;
        state.serialize_field("total_successes", &self.total_successes)?;
        state.serialize_field("total_rejections", &self.total_rejections)?;
        state.serialize_field("last_failure_ms_ago", &self.last_failure_ms_ago)?;
        state.serialize_field("time_in_state_ms", &self.time_in_state_ms)?;
        state.end()
    }
}
