//! Orchestrator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Subject patterns subscribed on start
    pub subjects: Vec<String>,
    /// Additional event subjects, subscribed when event subscriptions are enabled
    pub event_subjects: Vec<String>,
    /// Queue group shared by all subscriptions, for load-balanced consumers
    pub queue_group: Option<String>,
    /// How long `stop()` waits for in-flight messages
    pub drain_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            subjects: Vec::new(),
            event_subjects: Vec::new(),
            queue_group: None,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    /// Subjects `start()` would subscribe to.
    #[must_use]
    pub fn subscription_subjects(
        &self,
        subject_patterns: &[String],
        enable_event_subscriptions: bool,
    ) -> Vec<String> {
        let mut subjects = subject_patterns.to_vec();
        if enable_event_subscriptions {
            for subject in &self.event_subjects {
                if !subjects.contains(subject) {
                    subjects.push(subject.clone());
                }
            }
        }
        subjects
    }
}
