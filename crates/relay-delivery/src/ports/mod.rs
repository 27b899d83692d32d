//! Ports for the delivery orchestrator
//!
//! - Inbound: what producers and operators call ([`DeliveryApi`])
//! - Outbound: what the orchestrator calls ([`MessageProcessor`],
//!   [`MessageValidator`], [`OutcomeRecorder`])

pub mod inbound;
pub mod outbound;

pub use inbound::DeliveryApi;
pub use outbound::{AcceptAll, MessageProcessor, MessageValidator, OutcomeRecorder};
