//! # Relay Runtime
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration
//! 2. Connect the broker
//! 3. Start the orchestrator (all-or-nothing subscribe)
//!
//! ## Shutdown Sequence
//!
//! 1. Stop the orchestrator (unsubscribe, cancel retries, drain)
//! 2. Report remaining dead letters
//! 3. Disconnect the broker

use std::sync::Arc;

use anyhow::{Context, Result};
use relay_bus::MessageBroker;
use relay_delivery::{OutcomeRecorder, StopReport};
use tracing::{info, warn};

use crate::container::{DeliveryContainer, RelayConfig};

/// The relay process: container plus lifecycle.
pub struct RelayRuntime {
    container: DeliveryContainer,
}

impl RelayRuntime {
    /// Validate `config` and wire the container.
    pub fn new(config: RelayConfig, recorder: Arc<dyn OutcomeRecorder>) -> Result<Self> {
        config.validate().context("Invalid relay configuration")?;
        Ok(Self {
            container: DeliveryContainer::new(config, recorder),
        })
    }

    /// Connect the broker and start dispatching.
    pub async fn start(&self) -> Result<()> {
        info!("===========================================");
        info!("  Relay v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let broker = &self.container.broker;
        broker
            .connect()
            .await
            .with_context(|| format!("Failed to connect {} broker", broker.name()))?;

        let config = &self.container.config;
        self.container
            .orchestrator
            .start(
                &config.orchestrator.subjects,
                config.enable_event_subscriptions,
            )
            .await
            .context("Failed to start orchestrator")?;

        info!(
            subjects = ?config.orchestrator.subjects,
            events = config.enable_event_subscriptions,
            queue_group = ?config.orchestrator.queue_group,
            "Relay running"
        );
        Ok(())
    }

    /// Stop dispatching, report dead letters and disconnect.
    pub async fn shutdown(&self) -> Result<StopReport> {
        info!("Initiating graceful shutdown...");

        let report = self
            .container
            .orchestrator
            .stop()
            .await
            .context("Failed to stop orchestrator")?;

        let dead_letters = &self.container.dead_letters;
        if self.container.config.dlq.dump_on_shutdown {
            for entry in dead_letters.list() {
                warn!(
                    id = %entry.id,
                    subject = %entry.subject,
                    reason = %entry.reason,
                    attempts = entry.attempts,
                    error = %entry.error,
                    "Undelivered message"
                );
            }
        }
        let stats = dead_letters.stats();
        info!(
            depth = stats.depth,
            total_enqueued = stats.total_enqueued,
            total_replayed = stats.total_replayed,
            "Dead-letter queue at shutdown"
        );

        if let Err(e) = self.container.broker.disconnect().await {
            warn!(error = %e, "Broker disconnect failed");
        }

        info!("Shutdown complete");
        Ok(report)
    }

    /// The wired components.
    pub fn container(&self) -> &DeliveryContainer {
        &self.container
    }
}
