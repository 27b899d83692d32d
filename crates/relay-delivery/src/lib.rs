//! # Relay Delivery
//!
//! The delivery orchestrator: owns broker subscriptions, runs every inbound
//! message through validation, a circuit breaker and the retry handler, and
//! dead-letters whatever cannot be delivered.
//!
//! ## Lifecycle
//!
//! ```text
//! [Idle] ──start()──→ [Starting] ──all subscribed──→ [Running] ──stop()──→ [Stopping] ──→ [Stopped]
//!                         │
//!                         └── subscribe failed (rollback) ──→ [Idle]
//! ```
//!
//! ## Outcomes
//!
//! Every received message ends in exactly one terminal outcome:
//!
//! | Outcome | When |
//! |---------|------|
//! | `processed` | The processor returned `Ok` |
//! | `dead_lettered{circuit_open}` | The dispatch breaker rejected the call |
//! | `dead_lettered{retries_exhausted}` | Transient failures used up every attempt |
//! | `dead_lettered{rejected}` | Validation or a permanent processing failure |
//! | `dead_lettered{shutdown}` | Still pending when `stop()` ran out of drain time |
//!
//! `retried` is recorded once per extra attempt and is not terminal.
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  service.rs        - Orchestrator, OrchestratorBuilder          │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - DeliveryApi trait                          │
//! │  ports/outbound.rs - MessageProcessor, MessageValidator,        │
//! │                      OutcomeRecorder traits                     │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  domain/lifecycle.rs - OrchestratorState, StopReport            │
//! │  domain/outcome.rs   - Outcome                                  │
//! │  domain/in_flight.rs - InFlightRegistry                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

pub use config::OrchestratorConfig;
pub use domain::{
    ActiveSubscription, InFlightRegistry, OrchestratorState, Outcome, StopReport,
    UnsubscribeFailure,
};
pub use error::{DeliveryError, DeliveryResult, ProcessingError};
pub use metrics::{OutcomeCounters, OutcomeSnapshot};
pub use ports::{AcceptAll, DeliveryApi, MessageProcessor, MessageValidator, OutcomeRecorder};
pub use service::{Orchestrator, OrchestratorBuilder, DISPATCH_BREAKER, PUBLISH_BREAKER};
