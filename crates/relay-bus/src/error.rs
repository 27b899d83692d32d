//! # Broker Errors
//!
//! Every [`MessageBroker`](crate::MessageBroker) operation fails with a
//! [`BrokerError`]. Only malformed input is permanent; everything touching
//! the transport may succeed on a later attempt.

use std::time::Duration;

use relay_resilience::{ErrorClass, ErrorClassifier};
use thiserror::Error;

use crate::message::SubscriptionId;

/// Errors from broker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Could not establish the connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Publish was refused or the broker is not connected.
    #[error("publish to '{subject}' failed: {reason}")]
    Publish {
        /// Target subject.
        subject: String,
        /// Failure description.
        reason: String,
    },

    /// Payload exceeds the broker's limit.
    #[error("payload for '{subject}' is {size} bytes, limit is {limit}")]
    PayloadTooLarge {
        /// Target subject.
        subject: String,
        /// Serialized payload size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Subscription could not be created.
    #[error("subscribe to '{subject}' failed: {reason}")]
    Subscribe {
        /// Requested pattern.
        subject: String,
        /// Failure description.
        reason: String,
    },

    /// Subject or pattern is malformed.
    #[error("invalid subject '{subject}': {reason}")]
    InvalidSubject {
        /// Offending subject.
        subject: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Subscription could not be removed.
    #[error("unsubscribe {id} failed: {reason}")]
    Unsubscribe {
        /// Subscription being removed.
        id: SubscriptionId,
        /// Failure description.
        reason: String,
    },

    /// Request could not be sent or had no responders.
    #[error("request to '{subject}' failed: {reason}")]
    Request {
        /// Target subject.
        subject: String,
        /// Failure description.
        reason: String,
    },

    /// No reply arrived in time.
    #[error("request to '{subject}' timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// Target subject.
        subject: String,
        /// Time waited.
        timeout: Duration,
    },
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

impl BrokerError {
    pub(crate) fn publish(subject: &str, reason: impl Into<String>) -> Self {
        Self::Publish {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn subscribe(subject: &str, reason: impl Into<String>) -> Self {
        Self::Subscribe {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn request(subject: &str, reason: impl Into<String>) -> Self {
        Self::Request {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_subject(subject: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSubject {
            subject: subject.to_string(),
            reason: reason.into(),
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Publish { .. } => "publish",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Subscribe { .. } => "subscribe",
            Self::InvalidSubject { .. } => "invalid_subject",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Request { .. } => "request",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl ErrorClassifier for BrokerError {
    fn classify(&self) -> ErrorClass {
        match self {
            Self::PayloadTooLarge { .. } | Self::InvalidSubject { .. } => ErrorClass::Permanent,
            _ => ErrorClass::Transient,
        }
    }
}
