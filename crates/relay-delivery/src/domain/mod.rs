//! Domain types for the delivery orchestrator

pub mod in_flight;
pub mod lifecycle;
pub mod outcome;

pub use in_flight::{InFlightId, InFlightRegistry};
pub use lifecycle::{ActiveSubscription, OrchestratorState, StopReport, UnsubscribeFailure};
pub use outcome::Outcome;
