//! # Message Broker Port
//!
//! The only interface the delivery layer uses to reach the bus. Concrete
//! buses (NATS, Redis streams, the bundled in-memory adapter) implement it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BrokerError, BrokerResult};
use crate::message::{Message, MessageHandler, SubscriptionId};

/// Publish/subscribe bus with request-reply.
///
/// Every method may suspend on I/O and must be safe to call concurrently.
/// Implementations never retry on their own.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Establish the connection.
    ///
    /// Returns `Ok(true)` if this call connected and `Ok(false)` if the
    /// broker was already connected.
    async fn connect(&self) -> BrokerResult<bool>;

    /// Drop all subscriptions and the connection. Safe when not connected.
    async fn disconnect(&self) -> BrokerResult<()>;

    /// Cheap connection check.
    fn is_connected(&self) -> bool;

    /// Publish `payload` to `subject`.
    async fn publish(&self, subject: &str, payload: Value) -> BrokerResult<()>;

    /// Register `handler` for every message matching `subject`.
    ///
    /// Subscriptions sharing a `queue_group` split the traffic: each message
    /// goes to one member of the group.
    async fn subscribe(
        &self,
        subject: &str,
        handler: MessageHandler,
        queue_group: Option<&str>,
    ) -> BrokerResult<SubscriptionId>;

    /// Remove a subscription. Unknown ids are not an error.
    async fn unsubscribe(&self, id: SubscriptionId) -> BrokerResult<()>;

    /// Publish and wait up to `timeout` for a single reply.
    async fn request(
        &self,
        subject: &str,
        payload: Value,
        timeout: Duration,
    ) -> BrokerResult<Message>;

    /// Publish a reply to `request.reply_to`.
    async fn respond(&self, request: &Message, payload: Value) -> BrokerResult<()> {
        match request.reply_to.as_deref() {
            Some(reply_to) => self.publish(reply_to, payload).await,
            None => Err(BrokerError::Publish {
                subject: request.subject.clone(),
                reason: "message has no reply subject".to_string(),
            }),
        }
    }

    /// Adapter name for logs.
    fn name(&self) -> &'static str;
}
