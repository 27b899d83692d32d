//! Driving Ports (API - Inbound)

use async_trait::async_trait;
use relay_resilience::DeadLetterEntry;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::OrchestratorState;
use crate::error::DeliveryResult;

/// Producer- and operator-facing delivery API
///
/// Implemented by [`Orchestrator`](crate::Orchestrator). Application code
/// holds an `Arc<dyn DeliveryApi>` rather than the broker itself, so every
/// outbound message goes through the publish breaker and retry policy.
#[async_trait]
pub trait DeliveryApi: Send + Sync {
    /// Publish with circuit breaking, retry and dead-lettering
    async fn publish(&self, subject: &str, payload: Value) -> DeliveryResult<()>;

    /// Re-publish a dead letter; removed from the queue on success
    async fn replay_dead_letter(&self, id: Uuid) -> DeliveryResult<()>;

    /// Snapshot of the dead-letter queue
    fn dead_letters(&self) -> Vec<DeadLetterEntry>;

    /// Current lifecycle state
    fn state(&self) -> OrchestratorState;
}
