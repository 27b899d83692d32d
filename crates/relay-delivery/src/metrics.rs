//! # Delivery Metrics
//!
//! In-process outcome counters. Used as the default [`OutcomeRecorder`] and
//! in tests; the Prometheus exporter lives in `relay-telemetry`.
//!
//! ## Counters
//!
//! - `processed` - messages handled successfully
//! - `retried` - retry attempts
//! - `dead_lettered{reason}` - messages moved to the DLQ, by reason

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use relay_resilience::DeadLetterReason;
use serde::Serialize;

use crate::domain::Outcome;
use crate::ports::OutcomeRecorder;

const REASON_COUNT: usize = DeadLetterReason::ALL.len();

fn reason_index(reason: DeadLetterReason) -> usize {
    match reason {
        DeadLetterReason::CircuitOpen => 0,
        DeadLetterReason::RetriesExhausted => 1,
        DeadLetterReason::PublishFailed => 2,
        DeadLetterReason::Rejected => 3,
        DeadLetterReason::Shutdown => 4,
    }
}

/// Atomic outcome counters
#[derive(Debug, Default)]
pub struct OutcomeCounters {
    processed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: [AtomicU64; REASON_COUNT],
}

/// Point-in-time copy of [`OutcomeCounters`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSnapshot {
    /// Messages handled successfully
    pub processed: u64,
    /// Retry attempts
    pub retried: u64,
    /// Dead-lettered messages by reason label
    pub dead_lettered: HashMap<String, u64>,
}

impl OutcomeSnapshot {
    /// Dead-lettered messages across all reasons
    #[must_use]
    pub fn total_dead_lettered(&self) -> u64 {
        self.dead_lettered.values().sum()
    }

    /// Terminal outcomes recorded
    #[must_use]
    pub fn terminal(&self) -> u64 {
        self.processed + self.total_dead_lettered()
    }
}

impl OutcomeCounters {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages handled successfully
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Retry attempts
    #[must_use]
    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    /// Dead-lettered messages for one reason
    #[must_use]
    pub fn dead_lettered(&self, reason: DeadLetterReason) -> u64 {
        self.dead_lettered[reason_index(reason)].load(Ordering::Relaxed)
    }

    /// Copy all counters
    #[must_use]
    pub fn snapshot(&self) -> OutcomeSnapshot {
        OutcomeSnapshot {
            processed: self.processed(),
            retried: self.retried(),
            dead_lettered: DeadLetterReason::ALL
                .iter()
                .map(|reason| (reason.as_str().to_string(), self.dead_lettered(*reason)))
                .filter(|(_, count)| *count > 0)
                .collect(),
        }
    }
}

impl OutcomeRecorder for OutcomeCounters {
    fn record(&self, outcome: &Outcome, _subject: &str) {
        let counter = match outcome {
            Outcome::Processed => &self.processed,
            Outcome::Retried => &self.retried,
            Outcome::DeadLettered(reason) => &self.dead_lettered[reason_index(*reason)],
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
