//! Driven Ports (SPI - Outbound Dependencies)

use async_trait::async_trait;
use relay_bus::Message;
use relay_resilience::CircuitState;

use crate::domain::Outcome;
use crate::error::ProcessingError;

/// Application logic that handles one inbound message
///
/// Called through the dispatch circuit breaker. Return
/// [`ProcessingError::Transient`] for failures worth retrying.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// Handle a message
    async fn process(&self, message: &Message) -> Result<(), ProcessingError>;
}

/// Content check run before processing
///
/// A message that fails validation is dead-lettered as `rejected` and never
/// retried.
pub trait MessageValidator: Send + Sync {
    /// Accept or reject a message
    fn validate(&self, message: &Message) -> Result<(), ProcessingError>;
}

/// Validator that accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl MessageValidator for AcceptAll {
    fn validate(&self, _message: &Message) -> Result<(), ProcessingError> {
        Ok(())
    }
}

/// Sink for delivery outcomes and breaker state
pub trait OutcomeRecorder: Send + Sync {
    /// Record an outcome for a message on `subject`
    fn record(&self, outcome: &Outcome, subject: &str);

    /// Record a breaker's state after a call
    fn record_circuit_state(&self, _breaker: &str, _state: CircuitState) {}
}
