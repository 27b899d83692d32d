//! # Delivery Container
//!
//! Builds every component from a [`RelayConfig`] and holds them for the
//! lifetime of the process.
//!
//! ```text
//! RelayConfig ──→ InMemoryBroker
//!             ──→ CircuitBreaker (dispatch) ─┐
//!             ──→ CircuitBreaker (publish) ──┤
//!             ──→ RetryHandler ──────────────┼──→ Orchestrator
//!             ──→ DeadLetterQueue ───────────┤
//!                 LoggingProcessor ──────────┘
//! ```

pub mod config;

pub use config::{load_config, load_config_from, BrokerSettings, ConfigError, DlqSettings, RelayConfig};

use std::sync::Arc;

use relay_bus::InMemoryBroker;
use relay_delivery::{
    Orchestrator, OutcomeRecorder, DISPATCH_BREAKER, PUBLISH_BREAKER,
};
use relay_resilience::{CircuitBreaker, DeadLetterQueue, RetryHandler};
use tracing::info;

use crate::adapters::LoggingProcessor;

/// Central container holding the wired components.
pub struct DeliveryContainer {
    /// Configuration the container was built from.
    pub config: RelayConfig,
    /// Message bus adapter.
    pub broker: Arc<InMemoryBroker>,
    /// Delivery orchestrator.
    pub orchestrator: Arc<Orchestrator>,
    /// Dead-letter queue shared with the orchestrator.
    pub dead_letters: Arc<DeadLetterQueue>,
}

impl DeliveryContainer {
    /// Wire all components. The broker starts disconnected.
    pub fn new(config: RelayConfig, recorder: Arc<dyn OutcomeRecorder>) -> Self {
        let broker = Arc::new(InMemoryBroker::with_max_payload_bytes(
            config.broker.max_payload_bytes,
        ));
        let dead_letters = Arc::new(DeadLetterQueue::new());

        let orchestrator = Orchestrator::builder(
            broker.clone(),
            Arc::new(LoggingProcessor::new(broker.clone())),
        )
        .dispatch_breaker(Arc::new(CircuitBreaker::named(
            DISPATCH_BREAKER,
            config.dispatch_breaker.clone(),
        )))
        .publish_breaker(Arc::new(CircuitBreaker::named(
            PUBLISH_BREAKER,
            config.publish_breaker.clone(),
        )))
        .retry_handler(Arc::new(RetryHandler::new(config.retry.clone())))
        .dead_letter_queue(dead_letters.clone())
        .recorder(recorder)
        .config(config.orchestrator.clone())
        .build();

        info!(
            max_payload_bytes = config.broker.max_payload_bytes,
            subjects = config.orchestrator.subjects.len(),
            max_attempts = config.retry.max_attempts,
            "Delivery container wired"
        );

        Self {
            config,
            broker,
            orchestrator,
            dead_letters,
        }
    }
}
