//! Error types for the delivery orchestrator

use std::time::Duration;

use relay_bus::BrokerError;
use relay_resilience::{ErrorClass, ErrorClassifier};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::OrchestratorState;

/// Failure reported by a [`MessageProcessor`](crate::ports::MessageProcessor)
/// or [`MessageValidator`](crate::ports::MessageValidator).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// Worth retrying (downstream busy, lock contention, ...)
    #[error("transient processing failure: {0}")]
    Transient(String),

    /// Will fail again (malformed payload, unknown message type, ...)
    #[error("permanent processing failure: {0}")]
    Permanent(String),

    /// The processor's own broker call failed
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl ErrorClassifier for ProcessingError {
    fn classify(&self) -> ErrorClass {
        match self {
            Self::Transient(_) => ErrorClass::Transient,
            Self::Permanent(_) => ErrorClass::Permanent,
            Self::Broker(e) => e.classify(),
        }
    }
}

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The protecting circuit breaker rejected the call
    #[error("circuit '{breaker}' is open, retry in {}ms", .remaining.as_millis())]
    CircuitOpen {
        /// Breaker name
        breaker: String,
        /// Time until a probe is admitted
        remaining: Duration,
    },

    /// Broker operation failed
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Message processing failed
    #[error("processing failed: {0}")]
    Processing(#[from] ProcessingError),

    /// A subscription failed during start; nothing stays subscribed
    #[error("start failed: subscribe to '{subject}' failed: {source}")]
    Start {
        /// Subject whose subscription failed
        subject: String,
        /// Underlying broker error
        #[source]
        source: BrokerError,
    },

    /// Operation not allowed in the current lifecycle state
    #[error("invalid state: expected {expected}, was {actual}")]
    InvalidState {
        /// State the operation requires
        expected: OrchestratorState,
        /// State the orchestrator is in
        actual: OrchestratorState,
    },

    /// Shutdown claimed the message; it was dead-lettered as `shutdown`
    #[error("orchestrator is shutting down, message dead-lettered")]
    ShuttingDown,

    /// No dead letter with this id
    #[error("dead letter {0} not found")]
    DeadLetterNotFound(Uuid),
}

/// Result type for orchestrator operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;
