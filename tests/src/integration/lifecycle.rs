//! # Lifecycle Scenarios
//!
//! Start is all-or-nothing; stop always ends `Stopped` and never loses a
//! message that was in flight.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use relay_bus::{BrokerError, MessageBroker};
    use relay_delivery::{
        DeliveryError, Orchestrator, OrchestratorConfig, OrchestratorState, OutcomeCounters,
    };
    use relay_resilience::DeadLetterReason;
    use serde_json::json;

    use crate::integration::fixtures::{eventually, FlakyBroker, GatedProcessor, ScriptedProcessor};

    fn subjects(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn connected_broker() -> Arc<FlakyBroker> {
        let broker = FlakyBroker::new();
        broker.connect().await.unwrap();
        broker
    }

    // =========================================================================
    // START
    // =========================================================================

    #[tokio::test]
    async fn test_start_rolls_back_when_subscribe_fails_mid_list() {
        let broker = connected_broker().await;
        broker.fail_subscribe_to("presence.>");
        let orchestrator =
            Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![])).build();

        let err = orchestrator
            .start(&subjects(&["chat.*", "presence.>", "game.>"]), false)
            .await
            .unwrap_err();

        match err {
            DeliveryError::Start { subject, source } => {
                assert_eq!(subject, "presence.>");
                assert!(matches!(source, BrokerError::Subscribe { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert!(orchestrator.subscriptions().is_empty());
        // chat.* was made and rolled back; game.> was never attempted.
        assert_eq!(broker.subscribe_calls(), 2);
        assert_eq!(broker.unsubscribe_calls(), 1);
        assert_eq!(broker.inner().subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_start_again_after_failed_start() {
        let broker = connected_broker().await;
        broker.fail_subscribe_to("b");
        let orchestrator =
            Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![])).build();
        let list = subjects(&["a", "b"]);

        assert!(orchestrator.start(&list, false).await.is_err());
        broker.clear_failures();
        orchestrator.start(&list, false).await.unwrap();

        assert_eq!(orchestrator.state(), OrchestratorState::Running);
        assert_eq!(broker.inner().subscription_count(), 2);
    }

    #[tokio::test]
    async fn test_start_with_event_subscriptions_and_queue_group() {
        let broker = connected_broker().await;
        let orchestrator = Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![]))
            .config(OrchestratorConfig {
                event_subjects: subjects(&["system.events.>", "chat.*"]),
                queue_group: Some("workers".into()),
                ..OrchestratorConfig::default()
            })
            .build();

        orchestrator.start(&subjects(&["chat.*"]), true).await.unwrap();

        let active = orchestrator.subscriptions();
        assert_eq!(active.len(), 2);
        assert!(active
            .iter()
            .all(|s| s.queue_group.as_deref() == Some("workers")));
    }

    #[tokio::test]
    async fn test_start_on_disconnected_broker_fails() {
        let broker = FlakyBroker::new();
        let orchestrator =
            Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![])).build();

        let err = orchestrator.start(&subjects(&["a"]), false).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Start { .. }));
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    // =========================================================================
    // STOP
    // =========================================================================

    #[tokio::test]
    async fn test_stop_with_unsubscribe_failure_reaches_stopped() {
        let broker = connected_broker().await;
        broker.fail_unsubscribe_of("b");
        let orchestrator =
            Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![])).build();
        orchestrator
            .start(&subjects(&["a", "b", "c"]), false)
            .await
            .unwrap();

        let report = orchestrator.stop().await.unwrap();

        assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
        assert_eq!(report.unsubscribed, 2);
        assert_eq!(report.unsubscribe_failures.len(), 1);
        assert_eq!(report.unsubscribe_failures[0].subject, "b");
        assert!(!report.is_clean());
        assert_eq!(broker.unsubscribe_calls(), 3);
        assert_eq!(broker.inner().subscription_count(), 1);
        assert!(orchestrator.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_stop_dead_letters_message_stuck_past_deadline() {
        let broker = connected_broker().await;
        let processor = GatedProcessor::new();
        let counters = Arc::new(OutcomeCounters::new());
        let orchestrator = Orchestrator::builder(broker.clone(), processor.clone())
            .recorder(counters.clone())
            .config(OrchestratorConfig {
                drain_timeout: Duration::from_millis(50),
                ..OrchestratorConfig::default()
            })
            .build();
        orchestrator.start(&subjects(&["jobs.>"]), false).await.unwrap();

        broker.inner().publish("jobs.render", json!({"frame": 1})).await.unwrap();
        assert!(eventually(Duration::from_secs(1), || processor.entered() == 1).await);

        let report = orchestrator.stop().await.unwrap();

        assert_eq!(report.force_dead_lettered, 1);
        assert_eq!(report.drained, 0);
        let entries = orchestrator.dead_letter_queue().list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, DeadLetterReason::Shutdown);
        assert_eq!(entries[0].subject, "jobs.render");
        assert_eq!(entries[0].payload, json!({"frame": 1}));

        // A late finish must not record a second outcome.
        processor.release();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counters.snapshot().terminal(), 1);
        assert_eq!(counters.processed(), 0);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_messages() {
        let broker = connected_broker().await;
        let processor = GatedProcessor::new();
        let counters = Arc::new(OutcomeCounters::new());
        let orchestrator = Orchestrator::builder(broker.clone(), processor.clone())
            .recorder(counters.clone())
            .build();
        orchestrator.start(&subjects(&["jobs.>"]), false).await.unwrap();

        for i in 0..3 {
            broker.inner().publish("jobs.encode", json!({"n": i})).await.unwrap();
        }
        assert!(eventually(Duration::from_secs(1), || processor.entered() == 3).await);

        let stopping = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.stop().await })
        };
        assert!(
            eventually(Duration::from_secs(1), || {
                orchestrator.state() == OrchestratorState::Stopping
            })
            .await
        );
        processor.release();
        let report = stopping.await.unwrap().unwrap();

        assert_eq!(report.drained, 3);
        assert_eq!(report.force_dead_lettered, 0);
        assert_eq!(counters.processed(), 3);
        assert!(orchestrator.dead_letter_queue().is_empty());
    }

    #[tokio::test]
    async fn test_stop_requires_running() {
        let broker = connected_broker().await;
        let orchestrator =
            Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![])).build();

        let err = orchestrator.stop().await.unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::InvalidState {
                expected: OrchestratorState::Running,
                actual: OrchestratorState::Idle,
            }
        ));
    }
}
