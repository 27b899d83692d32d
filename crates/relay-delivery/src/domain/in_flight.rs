//! In-flight message registry
//!
//! Tracks every message between receipt and its terminal outcome. Whoever
//! removes an entry owns the terminal outcome: the dispatch path on normal
//! completion, or `stop()` when the drain deadline passes. A message can
//! therefore never be both processed and force-dead-lettered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use relay_resilience::RetryableMessage;
use tokio::sync::Notify;

/// Registry key for one in-flight message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InFlightId(u64);

/// Messages currently being dispatched
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    entries: Mutex<HashMap<InFlightId, RetryableMessage>>,
    next_id: AtomicU64,
    emptied: Notify,
}

impl InFlightRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a message
    pub fn register(&self, message: RetryableMessage) -> InFlightId {
        let id = InFlightId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().insert(id, message);
        id
    }

    /// Keep the tracked attempt count current
    pub fn set_attempt(&self, id: InFlightId, attempt: u32) {
        if let Some(message) = self.entries.lock().get_mut(&id) {
            message.attempt = attempt;
        }
    }

    /// Claim a message. `None` means someone else already claimed it.
    pub fn complete(&self, id: InFlightId) -> Option<RetryableMessage> {
        let mut entries = self.entries.lock();
        let message = entries.remove(&id);
        if entries.is_empty() {
            self.emptied.notify_waiters();
        }
        message
    }

    /// Claim everything still in flight
    pub fn drain_all(&self) -> Vec<RetryableMessage> {
        let mut entries = self.entries.lock();
        let drained = entries.drain().map(|(_, message)| message).collect();
        self.emptied.notify_waiters();
        drained
    }

    /// Messages in flight
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing is in flight
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Resolves once nothing is in flight
    pub async fn wait_empty(&self) {
        loop {
            let notified = self.emptied.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}
