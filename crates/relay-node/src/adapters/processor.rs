//! Default message processor: logs each message and acknowledges requests.

use std::sync::Arc;

use async_trait::async_trait;
use relay_bus::{Message, MessageBroker};
use relay_delivery::{MessageProcessor, ProcessingError};
use serde_json::json;
use tracing::info;

/// Logs every message; answers messages carrying `reply_to` with
/// `{"ack": true, "subject": <subject>}`.
pub struct LoggingProcessor {
    broker: Arc<dyn MessageBroker>,
}

impl LoggingProcessor {
    /// Create a processor replying through `broker`.
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl MessageProcessor for LoggingProcessor {
    async fn process(&self, message: &Message) -> Result<(), ProcessingError> {
        info!(
            subject = %message.subject,
            payload_bytes = message.payload_size(),
            "Message received"
        );

        if message.reply_to.is_some() {
            self.broker
                .respond(message, json!({"ack": true, "subject": message.subject}))
                .await?;
        }
        Ok(())
    }
}
