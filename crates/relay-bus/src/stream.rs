//! # Message Stream
//!
//! Pull-based alternative to handler callbacks. Implements
//! `tokio_stream::Stream` for use with stream combinators.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

use crate::memory::SubscriptionTable;
use crate::message::{Message, SubscriptionId};

/// Stream of messages for one subscription.
///
/// When dropped, the subscription is automatically removed. The stream ends
/// if the broker disconnects.
pub struct MessageStream {
    id: SubscriptionId,
    inner: UnboundedReceiverStream<Message>,
    subscriptions: SubscriptionTable,
}

impl MessageStream {
    pub(crate) fn new(
        id: SubscriptionId,
        inner: UnboundedReceiverStream<Message>,
        subscriptions: SubscriptionTable,
    ) -> Self {
        Self {
            id,
            inner,
            subscriptions,
        }
    }

    /// Subscription backing this stream.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.subscriptions.write().remove(&self.id);
        debug!(subscription = %self.id, "Stream subscription dropped");
    }
}
