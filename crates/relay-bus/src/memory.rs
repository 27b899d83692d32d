//! # In-Memory Broker
//!
//! Single-process [`MessageBroker`] adapter. Suitable for one node and for
//! tests; a distributed deployment plugs a real bus in behind the same trait.
//!
//! Each delivery runs in its own tokio task, so a slow handler never blocks
//! the publisher or other subscribers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::MessageBroker;
use crate::error::{BrokerError, BrokerResult};
use crate::message::{handler_fn, payload_size, Message, MessageHandler, SubscriptionId};
use crate::stream::MessageStream;
use crate::subject::{validate_subject, SubjectPattern};
use crate::{DEFAULT_MAX_PAYLOAD_BYTES, INBOX_PREFIX};

pub(crate) struct SubscriptionEntry {
    pattern: SubjectPattern,
    handler: MessageHandler,
    queue_group: Option<String>,
}

pub(crate) type SubscriptionTable = Arc<RwLock<HashMap<SubscriptionId, SubscriptionEntry>>>;

/// Broker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    /// Messages accepted by `publish` or `request`
    pub published: u64,
    /// Handler invocations scheduled
    pub delivered: u64,
    /// Active subscriptions, inboxes included
    pub subscriptions: usize,
}

/// In-process publish/subscribe broker.
pub struct InMemoryBroker {
    connected: AtomicBool,
    subscriptions: SubscriptionTable,
    /// Round-robin position per queue group.
    queue_cursors: Mutex<HashMap<String, usize>>,
    next_id: AtomicU64,
    messages_published: AtomicU64,
    messages_delivered: AtomicU64,
    max_payload_bytes: usize,
}

impl InMemoryBroker {
    /// Create a disconnected broker with the default payload limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_payload_bytes(DEFAULT_MAX_PAYLOAD_BYTES)
    }

    /// Create a disconnected broker with a custom payload limit.
    #[must_use]
    pub fn with_max_payload_bytes(max_payload_bytes: usize) -> Self {
        Self {
            connected: AtomicBool::new(false),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            queue_cursors: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            messages_published: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            max_payload_bytes,
        }
    }

    /// Payload limit in bytes.
    #[must_use]
    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            published: self.messages_published.load(Ordering::Relaxed),
            delivered: self.messages_delivered.load(Ordering::Relaxed),
            subscriptions: self.subscription_count(),
        }
    }

    /// Pull-based subscription: a stream of messages matching `pattern`.
    ///
    /// The subscription is removed when the stream is dropped.
    pub fn stream(&self, pattern: &str) -> BrokerResult<MessageStream> {
        self.ensure_connected_for_subscribe(pattern)?;
        let pattern = SubjectPattern::parse(pattern)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handler = handler_fn(move |message| {
            // Receiver gone means the stream was dropped mid-delivery.
            let _ = tx.send(message);
            async {}
        });

        let id = self.register(pattern, handler, None);
        Ok(MessageStream::new(
            id,
            UnboundedReceiverStream::new(rx),
            self.subscriptions.clone(),
        ))
    }

    fn ensure_connected_for_subscribe(&self, subject: &str) -> BrokerResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BrokerError::subscribe(subject, "not connected"))
        }
    }

    fn check_payload(&self, subject: &str, payload: &Value) -> BrokerResult<()> {
        let size = payload_size(payload);
        if size > self.max_payload_bytes {
            return Err(BrokerError::PayloadTooLarge {
                subject: subject.to_string(),
                size,
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }

    fn register(
        &self,
        pattern: SubjectPattern,
        handler: MessageHandler,
        queue_group: Option<String>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            subscription = %id,
            pattern = %pattern,
            queue_group = ?queue_group,
            "Subscription created"
        );
        self.subscriptions.write().insert(
            id,
            SubscriptionEntry {
                pattern,
                handler,
                queue_group,
            },
        );
        id
    }

    /// Handlers that should receive a message on `subject`.
    ///
    /// Plain subscriptions all receive it; each queue group contributes one
    /// member, chosen round-robin in subscription order.
    fn route(&self, subject: &str) -> Vec<MessageHandler> {
        let subscriptions = self.subscriptions.read();
        let mut targets = Vec::new();
        let mut groups: BTreeMap<&str, Vec<(SubscriptionId, &MessageHandler)>> = BTreeMap::new();

        for (id, entry) in subscriptions.iter() {
            if !entry.pattern.matches(subject) {
                continue;
            }
            match entry.queue_group.as_deref() {
                None => targets.push(entry.handler.clone()),
                Some(group) => groups.entry(group).or_default().push((*id, &entry.handler)),
            }
        }

        if !groups.is_empty() {
            let mut cursors = self.queue_cursors.lock();
            for (group, mut members) in groups {
                members.sort_by_key(|(id, _)| *id);
                let cursor = cursors.entry(group.to_string()).or_insert(0);
                let (_, handler) = members[*cursor % members.len()];
                *cursor = cursor.wrapping_add(1);
                targets.push(handler.clone());
            }
        }

        targets
    }

    /// Fan a message out to its subscribers. Returns the number of deliveries.
    fn deliver(&self, message: Message) -> usize {
        let targets = self.route(&message.subject);
        let count = targets.len();

        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.messages_delivered
            .fetch_add(count as u64, Ordering::Relaxed);

        if count == 0 {
            debug!(subject = %message.subject, "Message dropped (no subscribers)");
            return 0;
        }

        for handler in targets {
            tokio::spawn(handler(message.clone()));
        }
        debug!(subject = %message.subject, receivers = count, "Message published");
        count
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn connect(&self) -> BrokerResult<bool> {
        let was_connected = self.connected.swap(true, Ordering::SeqCst);
        if !was_connected {
            info!(broker = self.name(), "Broker connected");
        }
        Ok(!was_connected)
    }

    async fn disconnect(&self) -> BrokerResult<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let released = {
            let mut subscriptions = self.subscriptions.write();
            let released = subscriptions.len();
            subscriptions.clear();
            released
        };
        self.queue_cursors.lock().clear();
        info!(broker = self.name(), released, "Broker disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, subject: &str, payload: Value) -> BrokerResult<()> {
        if !self.is_connected() {
            return Err(BrokerError::publish(subject, "not connected"));
        }
        validate_subject(subject)?;
        self.check_payload(subject, &payload)?;

        self.deliver(Message::new(subject, payload));
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        handler: MessageHandler,
        queue_group: Option<&str>,
    ) -> BrokerResult<SubscriptionId> {
        self.ensure_connected_for_subscribe(subject)?;
        let pattern = SubjectPattern::parse(subject)?;
        let queue_group = queue_group
            .filter(|group| !group.is_empty())
            .map(str::to_string);

        Ok(self.register(pattern, handler, queue_group))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> BrokerResult<()> {
        if !self.is_connected() {
            return Err(BrokerError::Unsubscribe {
                id,
                reason: "not connected".to_string(),
            });
        }
        if self.subscriptions.write().remove(&id).is_some() {
            debug!(subscription = %id, "Subscription removed");
        } else {
            debug!(subscription = %id, "Unsubscribe for unknown subscription");
        }
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Value,
        timeout: Duration,
    ) -> BrokerResult<Message> {
        if !self.is_connected() {
            return Err(BrokerError::request(subject, "not connected"));
        }
        validate_subject(subject)?;
        self.check_payload(subject, &payload)?;

        let inbox = format!("{INBOX_PREFIX}.{}", Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();
        let reply_slot = Arc::new(Mutex::new(Some(tx)));
        let inbox_handler = handler_fn(move |reply| {
            let sender = reply_slot.lock().take();
            if let Some(sender) = sender {
                // Requester may have timed out already.
                let _ = sender.send(reply);
            }
            async {}
        });
        let inbox_id = self.register(SubjectPattern::parse(&inbox)?, inbox_handler, None);

        let delivered = self.deliver(Message::new(subject, payload).with_reply_to(inbox.clone()));
        let result = if delivered == 0 {
            Err(BrokerError::request(subject, "no responders"))
        } else {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) => Err(BrokerError::request(subject, "reply channel closed")),
                Err(_) => Err(BrokerError::Timeout {
                    subject: subject.to_string(),
                    timeout,
                }),
            }
        };

        self.subscriptions.write().remove(&inbox_id);
        result
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
