//! Cross-crate integration scenarios.

pub mod fixtures;

mod lifecycle;
mod publish_flows;
mod resilience_flows;
