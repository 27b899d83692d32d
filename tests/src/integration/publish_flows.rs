//! # Publish Flows
//!
//! Outbound path through the publish breaker and retry handler, dead-letter
//! replay, and request/reply through a running orchestrator.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use relay_bus::{BrokerError, InMemoryBroker, MessageBroker};
    use relay_delivery::{
        DeliveryApi, DeliveryError, Orchestrator, OrchestratorConfig, OutcomeCounters,
        PUBLISH_BREAKER,
    };
    use relay_node::adapters::LoggingProcessor;
    use relay_resilience::{
        CircuitBreaker, CircuitBreakerConfig, DeadLetterReason, RetryConfig, RetryHandler,
    };
    use serde_json::json;
    use tokio_stream::StreamExt;

    use crate::integration::fixtures::{eventually, FlakyBroker, ScriptedProcessor};

    fn fast_retry(max_attempts: u32) -> Arc<RetryHandler> {
        Arc::new(RetryHandler::new(RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            exponential_base: 2.0,
            jitter_factor: 0.0,
        }))
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_is_dead_lettered() {
        let broker = Arc::new(InMemoryBroker::new());
        let orchestrator = Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![]))
            .retry_handler(fast_retry(3))
            .build();

        let err = orchestrator
            .publish("chat.lobby", json!({"text": "hello"}))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::Broker(BrokerError::Publish { ref reason, .. }) if reason == "not connected"
        ));
        let entries = orchestrator.dead_letter_queue().list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, DeadLetterReason::PublishFailed);
        assert_eq!(entries[0].subject, "chat.lobby");
        assert_eq!(entries[0].payload, json!({"text": "hello"}));
        assert_eq!(entries[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_replay_after_reconnect() {
        let broker = Arc::new(InMemoryBroker::new());
        let orchestrator = Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![]))
            .retry_handler(fast_retry(2))
            .build();
        orchestrator
            .publish("chat.lobby", json!({"text": "late"}))
            .await
            .unwrap_err();
        let id = orchestrator.dead_letters()[0].id;

        broker.connect().await.unwrap();
        let mut stream = broker.stream("chat.>").unwrap();
        DeliveryApi::replay_dead_letter(orchestrator.as_ref(), id)
            .await
            .unwrap();

        let replayed = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replayed.subject, "chat.lobby");
        assert_eq!(replayed.payload, json!({"text": "late"}));
        assert!(orchestrator.dead_letters().is_empty());
        assert_eq!(orchestrator.dead_letter_queue().stats().total_replayed, 1);
    }

    #[tokio::test]
    async fn test_publish_recovers_from_transient_broker_failures() {
        let broker = FlakyBroker::new();
        broker.connect().await.unwrap();
        broker.fail_next_publishes(2);
        let counters = Arc::new(OutcomeCounters::new());
        let orchestrator = Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![]))
            .retry_handler(fast_retry(3))
            .recorder(counters.clone())
            .build();
        let mut stream = broker.inner().stream("presence.>").unwrap();

        orchestrator
            .publish("presence.online", json!({"user": "u-17"}))
            .await
            .unwrap();

        assert_eq!(broker.publish_calls(), 3);
        assert_eq!(counters.retried(), 2);
        assert_eq!(counters.processed(), 1);
        let received = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.payload, json!({"user": "u-17"}));
        assert!(orchestrator.dead_letter_queue().is_empty());
    }

    #[tokio::test]
    async fn test_publish_breaker_opens_after_repeated_failures() {
        let broker = FlakyBroker::new();
        broker.connect().await.unwrap();
        broker.fail_next_publishes(100);
        let publish_breaker = Arc::new(CircuitBreaker::named(
            PUBLISH_BREAKER,
            CircuitBreakerConfig::new(2, 1, Duration::from_secs(60)),
        ));
        let orchestrator = Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![]))
            .publish_breaker(publish_breaker.clone())
            .retry_handler(fast_retry(1))
            .build();

        for _ in 0..2 {
            let err = orchestrator.publish("game.tick", json!(1)).await.unwrap_err();
            assert!(matches!(err, DeliveryError::Broker(BrokerError::Connection(_))));
        }
        let err = orchestrator.publish("game.tick", json!(2)).await.unwrap_err();

        assert!(matches!(err, DeliveryError::CircuitOpen { ref breaker, .. } if breaker == PUBLISH_BREAKER));
        assert_eq!(broker.publish_calls(), 2);
        let reasons: Vec<DeadLetterReason> = orchestrator
            .dead_letters()
            .into_iter()
            .map(|entry| entry.reason)
            .collect();
        assert_eq!(
            reasons,
            vec![
                DeadLetterReason::PublishFailed,
                DeadLetterReason::PublishFailed,
                DeadLetterReason::CircuitOpen,
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_settles_publish_waiting_between_attempts() {
        let broker = FlakyBroker::new();
        broker.connect().await.unwrap();
        broker.fail_next_publishes(100);
        let orchestrator = Orchestrator::builder(broker.clone(), ScriptedProcessor::new(vec![]))
            .retry_handler(Arc::new(RetryHandler::new(RetryConfig {
                max_attempts: 5,
                base_delay: Duration::from_secs(10),
                max_delay: Duration::from_secs(30),
                exponential_base: 2.0,
                jitter_factor: 0.0,
            })))
            .config(OrchestratorConfig {
                drain_timeout: Duration::from_secs(1),
                ..OrchestratorConfig::default()
            })
            .build();
        orchestrator.start(&["chat.>".to_string()], false).await.unwrap();

        let publishing = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.publish("chat.lobby", json!({"text": "bye"})).await })
        };
        assert!(eventually(Duration::from_secs(1), || broker.publish_calls() == 1).await);

        let started = tokio::time::Instant::now();
        let report = orchestrator.stop().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.drained, 1);
        assert_eq!(orchestrator.in_flight(), 0);
        let entries = orchestrator.dead_letter_queue().list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, DeadLetterReason::Shutdown);
        assert_eq!(entries[0].payload, json!({"text": "bye"}));

        let result = tokio::time::timeout(Duration::from_secs(1), publishing)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(DeliveryError::ShuttingDown)));
        assert_eq!(broker.publish_calls(), 1);
    }

    #[tokio::test]
    async fn test_request_reply_through_running_orchestrator() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.connect().await.unwrap();
        let orchestrator =
            Orchestrator::builder(broker.clone(), Arc::new(LoggingProcessor::new(broker.clone())))
                .build();
        orchestrator.start(&["rpc.>".to_string()], false).await.unwrap();

        let reply = broker
            .request("rpc.ping", json!({"seq": 1}), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(reply.payload, json!({"ack": true, "subject": "rpc.ping"}));
        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_request_without_responders_fails_fast() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.connect().await.unwrap();

        let err = broker
            .request("rpc.nobody", json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::Request { .. }));
    }
}
