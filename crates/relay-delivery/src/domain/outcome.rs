//! Delivery outcomes
//!
//! Every message ends with exactly one terminal outcome: `Processed` or
//! `DeadLettered`. `Retried` is emitted once per retry attempt on the way.

use relay_resilience::DeadLetterReason;
use serde::Serialize;

/// Something that happened to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum Outcome {
    /// Handled successfully
    Processed,
    /// Another attempt is about to run
    Retried,
    /// Moved to the dead-letter queue
    DeadLettered(DeadLetterReason),
}

impl Outcome {
    /// Metric label for the outcome
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Retried => "retried",
            Self::DeadLettered(_) => "dead_lettered",
        }
    }

    /// Metric label for the reason; empty unless dead-lettered
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::DeadLettered(reason) => reason.as_str(),
            _ => "",
        }
    }

    /// True for `Processed` and `DeadLettered`
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retried)
    }
}
