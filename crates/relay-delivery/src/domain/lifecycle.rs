//! Orchestrator lifecycle
//!
//! ```text
//! [IDLE] ──start()──→ [STARTING] ──all subscribed──→ [RUNNING] ──stop()──→ [STOPPING] ──→ [STOPPED]
//!    ↑                     │
//!    └── subscribe failed ─┘  (everything subscribed so far is rolled back)
//! ```

use std::fmt;

use relay_bus::{BrokerError, SubscriptionId};
use serde::{Deserialize, Serialize};

/// Orchestrator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    /// Constructed, nothing subscribed
    Idle,
    /// Subscriptions being created
    Starting,
    /// Subscribed and dispatching
    Running,
    /// Unsubscribing and draining in-flight messages
    Stopping,
    /// Terminal
    Stopped,
}

impl OrchestratorState {
    /// Lowercase label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscription owned by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSubscription {
    /// Subject pattern
    pub subject: String,
    /// Broker-issued id
    pub id: SubscriptionId,
    /// Queue group, if any
    pub queue_group: Option<String>,
}

/// An unsubscribe that failed during stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeFailure {
    /// Subject pattern of the subscription
    pub subject: String,
    /// Broker-issued id
    pub id: SubscriptionId,
    /// What went wrong
    pub error: BrokerError,
}

/// Summary of a `stop()` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Subscriptions removed cleanly
    pub unsubscribed: usize,
    /// Subscriptions whose removal failed; teardown continued past them
    pub unsubscribe_failures: Vec<UnsubscribeFailure>,
    /// In-flight messages that finished before the drain deadline
    pub drained: usize,
    /// In-flight messages dead-lettered at the drain deadline
    pub force_dead_lettered: usize,
}

impl StopReport {
    /// True if every subscription was removed and nothing was force-dead-lettered
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unsubscribe_failures.is_empty() && self.force_dead_lettered == 0
    }
}
