//! # Relay Delivery Benchmarks
//!
//! | Component | Operation |
//! |-----------|-----------|
//! | CircuitBreaker | `call` overhead on the closed path |
//! | RetryHandler | `calculate_backoff` |
//! | DeadLetterQueue | `enqueue` |
//! | Orchestrator | `dispatch` of a successful message |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use relay_bus::{InMemoryBroker, Message};
use relay_delivery::{MessageProcessor, Orchestrator, ProcessingError};
use relay_resilience::{
    CircuitBreaker, CircuitBreakerConfig, DeadLetterEntry, DeadLetterQueue, DeadLetterReason,
    RetryConfig, RetryHandler,
};
use serde_json::json;

struct NoopProcessor;

#[async_trait::async_trait]
impl MessageProcessor for NoopProcessor {
    async fn process(&self, _message: &Message) -> Result<(), ProcessingError> {
        Ok(())
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("tokio runtime")
}

fn bench_circuit_breaker(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());

    let mut group = c.benchmark_group("circuit-breaker");
    group.throughput(Throughput::Elements(1));
    group.bench_function("call_closed", |b| {
        b.iter(|| {
            rt.block_on(breaker.call(|| async { Ok::<_, ProcessingError>(black_box(1u32)) }))
        })
    });
    group.finish();
}

fn bench_backoff(c: &mut Criterion) {
    let handler = RetryHandler::new(RetryConfig::default());

    let mut group = c.benchmark_group("retry");
    group.bench_function("calculate_backoff", |b| {
        b.iter(|| {
            for attempt in 0..10 {
                black_box(handler.calculate_backoff(black_box(attempt)));
            }
        })
    });
    group.finish();
}

fn bench_dead_letter_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("dead-letter-queue");
    group.measurement_time(Duration::from_secs(5));
    group.bench_function("enqueue_1000", |b| {
        b.iter(|| {
            let dlq = DeadLetterQueue::new();
            for i in 0..1000 {
                dlq.enqueue(DeadLetterEntry::new(
                    "orders.created",
                    json!({"id": i}),
                    DeadLetterReason::RetriesExhausted,
                    "downstream busy",
                    3,
                ));
            }
            black_box(dlq.len())
        })
    });
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = runtime();
    let orchestrator = Orchestrator::builder(Arc::new(InMemoryBroker::new()), Arc::new(NoopProcessor))
        .build();

    let mut group = c.benchmark_group("orchestrator");
    group.throughput(Throughput::Elements(1));
    group.bench_function("dispatch_processed", |b| {
        b.iter(|| {
            let message = Message::new("chat.lobby", json!({"text": "hi"}));
            rt.block_on(orchestrator.dispatch(black_box(message)))
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_circuit_breaker,
    bench_backoff,
    bench_dead_letter_enqueue,
    bench_dispatch
);
criterion_main!(benches);
