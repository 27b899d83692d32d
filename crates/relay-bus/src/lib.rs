//! # Relay Bus - Message Broker Abstraction
//!
//! The boundary between the delivery layer and whatever publish/subscribe
//! bus carries the messages.
//!
//! ```text
//! ┌──────────────┐   publish()    ┌─────────────────┐   handler(msg)   ┌──────────────┐
//! │   Producer   │ ─────────────► │  MessageBroker  │ ───────────────► │  Subscriber  │
//! └──────────────┘                │  (trait object) │                  └──────────────┘
//!                                 └─────────────────┘
//!                                    ▲         │
//!                         request()  │         │  reply on _INBOX.<id>
//!                                    └─────────┘
//! ```
//!
//! - [`MessageBroker`]: narrow async trait any concrete bus can implement
//! - [`InMemoryBroker`]: single-process adapter used by the node and by tests
//! - [`SubjectPattern`]: dot-separated subjects with `*` and `>` wildcards
//! - [`BrokerError`]: failure taxonomy, classified for retry decisions

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod error;
pub mod memory;
pub mod message;
pub mod stream;
pub mod subject;

// Re-export main types
pub use broker::MessageBroker;
pub use error::{BrokerError, BrokerResult};
pub use memory::{BrokerStats, InMemoryBroker};
pub use message::{handler_fn, Message, MessageHandler, SubscriptionId};
pub use stream::MessageStream;
pub use subject::{validate_subject, SubjectPattern};

/// Largest payload the in-memory broker accepts by default (1 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Subject prefix for request-reply inboxes.
pub const INBOX_PREFIX: &str = "_INBOX";
