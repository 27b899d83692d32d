//! # Resilience Flows
//!
//! Breaker and retry behaviour observed through the orchestrator, with
//! outcomes counted by both recorders.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use prometheus::Registry;
    use relay_bus::{InMemoryBroker, Message, MessageBroker};
    use relay_delivery::{
        Orchestrator, OutcomeCounters, Outcome, ProcessingError, DISPATCH_BREAKER,
    };
    use relay_resilience::{
        CircuitBreaker, CircuitBreakerConfig, CircuitState, DeadLetterReason, RetryConfig,
        RetryHandler,
    };
    use relay_telemetry::PrometheusRecorder;
    use serde_json::json;

    use crate::integration::fixtures::{eventually, PayloadDrivenProcessor, ScriptedProcessor};

    fn retry(max_attempts: u32, base_delay: Duration) -> Arc<RetryHandler> {
        Arc::new(RetryHandler::new(RetryConfig {
            max_attempts,
            base_delay,
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter_factor: 0.0,
        }))
    }

    fn breaker(failures: u32, successes: u32, timeout: Duration) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::named(
            DISPATCH_BREAKER,
            CircuitBreakerConfig::new(failures, successes, timeout),
        ))
    }

    fn message(n: u32) -> Message {
        Message::new("orders.created", json!({"order": n}))
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_rejects_and_recovers() {
        let processor = ScriptedProcessor::failing_transiently(3);
        let counters = Arc::new(OutcomeCounters::new());
        let dispatch_breaker = breaker(3, 2, Duration::from_secs(60));
        let orchestrator =
            Orchestrator::builder(Arc::new(InMemoryBroker::new()), processor.clone())
                .dispatch_breaker(dispatch_breaker.clone())
                .retry_handler(retry(1, Duration::from_secs(1)))
                .recorder(counters.clone())
                .build();

        for n in 0..3 {
            assert_eq!(
                orchestrator.dispatch(message(n)).await,
                Some(Outcome::DeadLettered(DeadLetterReason::RetriesExhausted))
            );
        }
        assert_eq!(dispatch_breaker.get_state(), CircuitState::Open);

        // Open: rejected without reaching the processor.
        assert_eq!(
            orchestrator.dispatch(message(3)).await,
            Some(Outcome::DeadLettered(DeadLetterReason::CircuitOpen))
        );
        assert_eq!(processor.calls(), 3);

        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(orchestrator.dispatch(message(4)).await, Some(Outcome::Processed));
        assert_eq!(dispatch_breaker.get_state(), CircuitState::HalfOpen);
        assert_eq!(orchestrator.dispatch(message(5)).await, Some(Outcome::Processed));

        let stats = dispatch_breaker.get_stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.total_rejections, 1);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.total_dead_lettered(), 4);
        assert_eq!(orchestrator.dead_letter_queue().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_recovered_by_retry() {
        let processor = ScriptedProcessor::failing_transiently(2);
        let counters = Arc::new(OutcomeCounters::new());
        let orchestrator =
            Orchestrator::builder(Arc::new(InMemoryBroker::new()), processor.clone())
                .retry_handler(retry(3, Duration::from_secs(1)))
                .recorder(counters.clone())
                .build();

        let started = tokio::time::Instant::now();
        let outcome = orchestrator.dispatch(message(1)).await;

        assert_eq!(outcome, Some(Outcome::Processed));
        assert_eq!(processor.calls(), 3);
        assert_eq!(counters.retried(), 2);
        // 1s before the second attempt, 2s before the third.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3100));
        assert_eq!(orchestrator.retry_handler().stats().recovered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_skips_retry() {
        let processor = ScriptedProcessor::new(vec![Err(ProcessingError::Permanent(
            "unknown message type".into(),
        ))]);
        let orchestrator =
            Orchestrator::builder(Arc::new(InMemoryBroker::new()), processor.clone())
                .retry_handler(retry(5, Duration::from_secs(1)))
                .build();

        let started = tokio::time::Instant::now();
        let outcome = orchestrator.dispatch(message(1)).await;

        assert_eq!(outcome, Some(Outcome::DeadLettered(DeadLetterReason::Rejected)));
        assert_eq!(processor.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        let entry = &orchestrator.dead_letter_queue().list()[0];
        assert_eq!(entry.attempts, 1);
        assert!(entry.error.contains("unknown message type"));
    }

    #[tokio::test]
    async fn test_prometheus_recorder_counts_outcomes() {
        let registry = Registry::new();
        let recorder = PrometheusRecorder::new(&registry).unwrap();
        let processor = ScriptedProcessor::new(vec![
            Ok(()),
            Err(ProcessingError::Permanent("bad".into())),
        ]);
        let orchestrator = Orchestrator::builder(Arc::new(InMemoryBroker::new()), processor)
            .recorder(Arc::new(recorder.clone()))
            .build();

        orchestrator.dispatch(message(1)).await;
        orchestrator.dispatch(message(2)).await;

        assert_eq!(recorder.outcome_count("processed", ""), 1);
        assert_eq!(recorder.outcome_count("dead_lettered", "rejected"), 1);
        assert_eq!(recorder.circuit_gauge(DISPATCH_BREAKER), 0);
    }

    /// 60 messages, a third each of ok, flaky and permanent, through a
    /// running orchestrator.
    async fn run_mixed_traffic() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.connect().await.unwrap();
        let counters = Arc::new(OutcomeCounters::new());
        let orchestrator = Orchestrator::builder(broker.clone(), PayloadDrivenProcessor::new())
            .retry_handler(retry(3, Duration::from_millis(1)))
            .dispatch_breaker(breaker(1_000, 1, Duration::from_secs(60)))
            .recorder(counters.clone())
            .build();
        orchestrator
            .start(&["orders.>".to_string()], false)
            .await
            .unwrap();

        let kinds = ["ok", "flaky", "permanent"];
        for id in 0..60u64 {
            let kind = kinds[(id % 3) as usize];
            broker
                .publish("orders.created", json!({"id": id, "kind": kind}))
                .await
                .unwrap();
        }

        assert!(
            eventually(Duration::from_secs(5), || counters.snapshot().terminal() == 60).await
        );
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.processed, 40);
        assert_eq!(counters.dead_lettered(DeadLetterReason::Rejected), 20);
        assert_eq!(snapshot.retried, 20);
        assert_eq!(orchestrator.in_flight(), 0);

        let report = orchestrator.stop().await.unwrap();
        assert_eq!(report.force_dead_lettered, 0);
        assert_eq!(counters.snapshot().terminal(), 60);
        assert_eq!(orchestrator.dead_letter_queue().len(), 20);
    }

    #[tokio::test]
    async fn test_every_message_gets_exactly_one_terminal_outcome() {
        run_mixed_traffic().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_message_gets_exactly_one_terminal_outcome_across_threads() {
        run_mixed_traffic().await;
    }
}
