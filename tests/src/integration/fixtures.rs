//! Test fixtures shared by the integration scenarios.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_bus::{
    BrokerError, BrokerResult, InMemoryBroker, Message, MessageBroker, MessageHandler,
    SubscriptionId,
};
use relay_delivery::{MessageProcessor, ProcessingError};
use serde_json::Value;
use tokio::sync::Notify;

// =============================================================================
// FlakyBroker
// =============================================================================

/// [`InMemoryBroker`] wrapper with injectable failures.
#[derive(Default)]
pub struct FlakyBroker {
    inner: InMemoryBroker,
    fail_subscribe: Mutex<HashSet<String>>,
    fail_unsubscribe: Mutex<HashSet<String>>,
    subjects_by_id: Mutex<HashMap<SubscriptionId, String>>,
    publish_failures: AtomicU32,
    publish_calls: AtomicU32,
    subscribe_calls: AtomicU32,
    unsubscribe_calls: AtomicU32,
}

impl FlakyBroker {
    /// Wrap a fresh, disconnected in-memory broker.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The wrapped broker.
    pub fn inner(&self) -> &InMemoryBroker {
        &self.inner
    }

    /// `subscribe(subject)` fails until cleared.
    pub fn fail_subscribe_to(&self, subject: &str) {
        self.fail_subscribe.lock().insert(subject.to_string());
    }

    /// `unsubscribe` of the subscription made for `subject` fails.
    pub fn fail_unsubscribe_of(&self, subject: &str) {
        self.fail_unsubscribe.lock().insert(subject.to_string());
    }

    /// Remove all injected subscribe/unsubscribe failures.
    pub fn clear_failures(&self) {
        self.fail_subscribe.lock().clear();
        self.fail_unsubscribe.lock().clear();
        self.publish_failures.store(0, Ordering::SeqCst);
    }

    /// The next `count` publishes fail with a connection error.
    pub fn fail_next_publishes(&self, count: u32) {
        self.publish_failures.store(count, Ordering::SeqCst);
    }

    /// Publish calls that reached this broker.
    pub fn publish_calls(&self) -> u32 {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Subscribe calls that reached this broker.
    pub fn subscribe_calls(&self) -> u32 {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Unsubscribe calls that reached this broker.
    pub fn unsubscribe_calls(&self) -> u32 {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    fn take_publish_failure(&self) -> bool {
        self.publish_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MessageBroker for FlakyBroker {
    async fn connect(&self) -> BrokerResult<bool> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> BrokerResult<()> {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn publish(&self, subject: &str, payload: Value) -> BrokerResult<()> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_publish_failure() {
            return Err(BrokerError::Connection("injected publish failure".into()));
        }
        self.inner.publish(subject, payload).await
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: MessageHandler,
        queue_group: Option<&str>,
    ) -> BrokerResult<SubscriptionId> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.lock().contains(subject) {
            return Err(BrokerError::Subscribe {
                subject: subject.to_string(),
                reason: "injected subscribe failure".into(),
            });
        }
        let id = self.inner.subscribe(subject, handler, queue_group).await?;
        self.subjects_by_id.lock().insert(id, subject.to_string());
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> BrokerResult<()> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        let subject = self.subjects_by_id.lock().get(&id).cloned();
        if let Some(subject) = subject {
            if self.fail_unsubscribe.lock().contains(&subject) {
                return Err(BrokerError::Unsubscribe {
                    id,
                    reason: "injected unsubscribe failure".into(),
                });
            }
        }
        self.inner.unsubscribe(id).await
    }

    async fn request(&self, subject: &str, payload: Value, timeout: Duration) -> BrokerResult<Message> {
        self.inner.request(subject, payload, timeout).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

// =============================================================================
// Processors
// =============================================================================

/// Replays a scripted sequence of results, then succeeds.
#[derive(Default)]
pub struct ScriptedProcessor {
    script: Mutex<VecDeque<Result<(), ProcessingError>>>,
    calls: AtomicU32,
}

impl ScriptedProcessor {
    /// Processor answering with `script` in order.
    pub fn new(script: Vec<Result<(), ProcessingError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        })
    }

    /// Processor failing transiently `count` times, then succeeding.
    pub fn failing_transiently(count: usize) -> Arc<Self> {
        Self::new(vec![Err(ProcessingError::Transient("downstream busy".into())); count])
    }

    /// Number of `process` calls.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageProcessor for ScriptedProcessor {
    async fn process(&self, _message: &Message) -> Result<(), ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().pop_front().unwrap_or(Ok(()))
    }
}

/// Holds every message until [`release`](Self::release) is called.
#[derive(Default)]
pub struct GatedProcessor {
    gate: Notify,
    entered: AtomicU32,
}

impl GatedProcessor {
    /// A closed gate.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Let all waiting messages through.
    pub fn release(&self) {
        self.gate.notify_waiters();
    }

    /// Messages currently or previously inside `process`.
    pub fn entered(&self) -> u32 {
        self.entered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageProcessor for GatedProcessor {
    async fn process(&self, _message: &Message) -> Result<(), ProcessingError> {
        let notified = self.gate.notified();
        self.entered.fetch_add(1, Ordering::SeqCst);
        notified.await;
        Ok(())
    }
}

/// Outcome decided by the message payload's `"kind"` field:
/// `"permanent"` fails permanently, `"flaky"` fails transiently once per
/// `"id"`, anything else succeeds.
#[derive(Default)]
pub struct PayloadDrivenProcessor {
    failed_once: Mutex<HashSet<u64>>,
}

impl PayloadDrivenProcessor {
    /// New processor with no history.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl MessageProcessor for PayloadDrivenProcessor {
    async fn process(&self, message: &Message) -> Result<(), ProcessingError> {
        let id = message.payload["id"].as_u64().unwrap_or_default();
        match message.payload["kind"].as_str() {
            Some("permanent") => Err(ProcessingError::Permanent(format!("message {id} is malformed"))),
            Some("flaky") if self.failed_once.lock().insert(id) => {
                Err(ProcessingError::Transient(format!("message {id} hit a busy downstream")))
            }
            _ => Ok(()),
        }
    }
}

/// Poll `condition` until it holds or `limit` passes.
pub async fn eventually(limit: Duration, condition: impl Fn() -> bool) -> bool {
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .is_ok()
}
