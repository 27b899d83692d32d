//! Dead Letter Queue
//!
//! Holds messages that could not be delivered so an operator can inspect,
//! replay or purge them. Entries are never evicted automatically and live
//! for the life of the process.
//!
//! `enqueue` only takes a short in-memory lock, so it is safe to call from
//! any failure path without risking a second failure.

use std::collections::{HashMap, VecDeque};
use std::future::Future;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ReplayError;
use crate::retry::RetryableMessage;

/// Why a message ended up in the dead-letter queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Rejected by an open circuit breaker
    CircuitOpen,
    /// Every allowed attempt failed transiently
    RetriesExhausted,
    /// Outbound publish failed
    PublishFailed,
    /// Failed validation or failed permanently
    Rejected,
    /// Still in flight when the shutdown drain deadline passed
    Shutdown,
}

impl DeadLetterReason {
    /// All reasons, in declaration order.
    pub const ALL: [DeadLetterReason; 5] = [
        Self::CircuitOpen,
        Self::RetriesExhausted,
        Self::PublishFailed,
        Self::Rejected,
        Self::Shutdown,
    ];

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::RetriesExhausted => "retries_exhausted",
            Self::PublishFailed => "publish_failed",
            Self::Rejected => "rejected",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that could not be delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Unique entry id, used for replay and purge
    pub id: Uuid,
    /// Original subject
    pub subject: String,
    /// Original payload
    pub payload: Value,
    /// Failure category
    pub reason: DeadLetterReason,
    /// Description of the last error
    pub error: String,
    /// Wall-clock enqueue time
    pub enqueued_at: DateTime<Utc>,
    /// Attempts made before giving up
    pub attempts: u32,
}

impl DeadLetterEntry {
    /// Build an entry with a fresh id and the current time.
    pub fn new(
        subject: impl Into<String>,
        payload: Value,
        reason: DeadLetterReason,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: subject.into(),
            payload,
            reason,
            error: error.into(),
            enqueued_at: Utc::now(),
            attempts,
        }
    }

    /// Build an entry from a message's retry state.
    pub fn from_message(
        message: &RetryableMessage,
        reason: DeadLetterReason,
        error: impl Into<String>,
    ) -> Self {
        Self::new(
            message.subject.clone(),
            message.payload.clone(),
            reason,
            error,
            message.attempt,
        )
    }
}

/// DLQ counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeadLetterStats {
    /// Entries currently queued
    pub depth: usize,
    /// Entries ever enqueued
    pub total_enqueued: u64,
    /// Entries removed by a successful replay
    pub total_replayed: u64,
    /// Entries removed by purge
    pub total_purged: u64,
    /// Entries ever enqueued, per reason label
    pub by_reason: HashMap<String, u64>,
}

#[derive(Default)]
struct DlqState {
    entries: VecDeque<DeadLetterEntry>,
    total_enqueued: u64,
    total_replayed: u64,
    total_purged: u64,
    by_reason: HashMap<DeadLetterReason, u64>,
}

/// In-memory dead-letter queue
#[derive(Default)]
pub struct DeadLetterQueue {
    state: Mutex<DlqState>,
}

impl std::fmt::Debug for DeadLetterQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterQueue")
            .field("depth", &self.len())
            .finish()
    }
}

impl DeadLetterQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Never fails.
    pub fn enqueue(&self, entry: DeadLetterEntry) {
        warn!(
            id = %entry.id,
            subject = %entry.subject,
            reason = entry.reason.as_str(),
            attempts = entry.attempts,
            error = %entry.error,
            "Message dead-lettered"
        );

        let mut state = self.state.lock();
        state.total_enqueued += 1;
        *state.by_reason.entry(entry.reason).or_insert(0) += 1;
        state.entries.push_back(entry);
    }

    /// Snapshot of all entries, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<DeadLetterEntry> {
        self.state.lock().entries.iter().cloned().collect()
    }

    /// Copy of a single entry.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<DeadLetterEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// Remove every entry matching `predicate`. Returns how many were removed.
    pub fn purge<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&DeadLetterEntry) -> bool,
    {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|e| !predicate(e));
        let removed = before - state.entries.len();
        state.total_purged += removed as u64;
        drop(state);

        if removed > 0 {
            info!(removed, "Purged dead letters");
        }
        removed
    }

    /// Hand a copy of entry `id` to `handler`; remove it only if the handler
    /// succeeds.
    ///
    /// The lock is not held while the handler runs. An entry purged in the
    /// meantime is simply not found on removal.
    pub async fn replay<F, Fut, E>(&self, id: Uuid, handler: F) -> Result<(), ReplayError<E>>
    where
        F: FnOnce(DeadLetterEntry) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let entry = self.get(id).ok_or(ReplayError::NotFound(id))?;
        debug!(id = %id, subject = %entry.subject, "Replaying dead letter");

        handler(entry).await.map_err(ReplayError::Handler)?;

        let mut state = self.state.lock();
        if let Some(pos) = state.entries.iter().position(|e| e.id == id) {
            state.entries.remove(pos);
        }
        state.total_replayed += 1;
        drop(state);

        info!(id = %id, "Dead letter replayed");
        Ok(())
    }

    /// Entries currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True if nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> DeadLetterStats {
        let state = self.state.lock();
        DeadLetterStats {
            depth: state.entries.len(),
            total_enqueued: state.total_enqueued,
            total_replayed: state.total_replayed,
            total_purged: state.total_purged,
            by_reason: state
                .by_reason
                .iter()
                .map(|(reason, count)| (reason.as_str().to_string(), *count))
                .collect(),
        }
    }
}
