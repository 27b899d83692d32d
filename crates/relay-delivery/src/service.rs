//! Orchestrator - subscription lifecycle, resilient dispatch and publish
//!
//! ## Inbound Flow
//!
//! ```text
//! broker ──handler──→ dispatch()
//!                        │
//!                        ├── validator ──reject──────────────────────────→ DLQ (rejected)
//!                        │
//!                        └── dispatch breaker ──open─────────────────────→ DLQ (circuit_open)
//!                               │
//!                               ├── ok ──────────────────────────────────→ processed
//!                               ├── permanent ───────────────────────────→ DLQ (rejected)
//!                               └── transient ──→ RetryHandler
//!                                                   ├── ok ──────────────→ processed
//!                                                   ├── open ────────────→ DLQ (circuit_open)
//!                                                   ├── shutdown ────────→ DLQ (shutdown)
//!                                                   └── exhausted ───────→ DLQ (retries_exhausted)
//! ```
//!
//! ## Outbound Flow
//!
//! `publish()` runs `broker.publish` through the publish breaker and the
//! retry handler. Failures are dead-lettered as `publish_failed` (or
//! `circuit_open`) and returned to the caller.
//!
//! ## Shutdown
//!
//! Both paths register in the in-flight registry under the state lock, so
//! once `stop()` has moved to `Stopping` nothing new is admitted and every
//! admitted message is either drained, cancelled in backoff, or
//! force-dead-lettered before `stop()` returns.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use relay_bus::{handler_fn, BrokerError, Message, MessageBroker, MessageHandler};
use relay_resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitError, DeadLetterEntry, DeadLetterQueue,
    DeadLetterReason, ErrorClassifier, ReplayError, RetryFailure, RetryHandler, RetryableMessage,
};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::domain::{
    ActiveSubscription, InFlightId, InFlightRegistry, OrchestratorState, Outcome, StopReport,
    UnsubscribeFailure,
};
use crate::error::{DeliveryError, DeliveryResult, ProcessingError};
use crate::metrics::OutcomeCounters;
use crate::ports::{AcceptAll, DeliveryApi, MessageProcessor, MessageValidator, OutcomeRecorder};

/// Name of the default inbound breaker
pub const DISPATCH_BREAKER: &str = "dispatch";

/// Name of the default outbound breaker
pub const PUBLISH_BREAKER: &str = "publish";

/// Terminal failure: where the message goes and why.
type DeadLetter = (DeadLetterReason, String);

/// Delivery orchestrator
///
/// Built with [`Orchestrator::builder`]; always handled through an `Arc`
/// because broker callbacks hold a weak reference back to it.
pub struct Orchestrator {
    broker: Arc<dyn MessageBroker>,
    processor: Arc<dyn MessageProcessor>,
    validator: Arc<dyn MessageValidator>,
    recorder: Arc<dyn OutcomeRecorder>,
    dispatch_breaker: Arc<CircuitBreaker>,
    publish_breaker: Arc<CircuitBreaker>,
    retry: Arc<RetryHandler>,
    dlq: Arc<DeadLetterQueue>,
    config: OrchestratorConfig,
    state: RwLock<OrchestratorState>,
    subscriptions: RwLock<Vec<ActiveSubscription>>,
    in_flight: InFlightRegistry,
    shutdown: watch::Sender<bool>,
    this: Weak<Orchestrator>,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    broker: Arc<dyn MessageBroker>,
    processor: Arc<dyn MessageProcessor>,
    validator: Arc<dyn MessageValidator>,
    recorder: Arc<dyn OutcomeRecorder>,
    dispatch_breaker: Option<Arc<CircuitBreaker>>,
    publish_breaker: Option<Arc<CircuitBreaker>>,
    retry: Option<Arc<RetryHandler>>,
    dlq: Option<Arc<DeadLetterQueue>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Inbound breaker (default: `dispatch`, default thresholds)
    #[must_use]
    pub fn dispatch_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.dispatch_breaker = Some(breaker);
        self
    }

    /// Outbound breaker (default: `publish`, default thresholds)
    #[must_use]
    pub fn publish_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.publish_breaker = Some(breaker);
        self
    }

    /// Retry policy (default: [`RetryConfig::default`](relay_resilience::RetryConfig))
    #[must_use]
    pub fn retry_handler(mut self, retry: Arc<RetryHandler>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Dead-letter queue (default: a fresh one)
    #[must_use]
    pub fn dead_letter_queue(mut self, dlq: Arc<DeadLetterQueue>) -> Self {
        self.dlq = Some(dlq);
        self
    }

    /// Content validator (default: [`AcceptAll`])
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn MessageValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Outcome sink (default: [`OutcomeCounters`])
    #[must_use]
    pub fn recorder(mut self, recorder: Arc<dyn OutcomeRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Orchestrator settings
    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the orchestrator in the `Idle` state
    #[must_use]
    pub fn build(self) -> Arc<Orchestrator> {
        let (shutdown, _) = watch::channel(false);
        Arc::new_cyclic(|this| Orchestrator {
            broker: self.broker,
            processor: self.processor,
            validator: self.validator,
            recorder: self.recorder,
            dispatch_breaker: self.dispatch_breaker.unwrap_or_else(|| {
                Arc::new(CircuitBreaker::named(
                    DISPATCH_BREAKER,
                    CircuitBreakerConfig::default(),
                ))
            }),
            publish_breaker: self.publish_breaker.unwrap_or_else(|| {
                Arc::new(CircuitBreaker::named(
                    PUBLISH_BREAKER,
                    CircuitBreakerConfig::default(),
                ))
            }),
            retry: self.retry.unwrap_or_default(),
            dlq: self.dlq.unwrap_or_default(),
            config: self.config,
            state: RwLock::new(OrchestratorState::Idle),
            subscriptions: RwLock::new(Vec::new()),
            in_flight: InFlightRegistry::new(),
            shutdown,
            this: this.clone(),
        })
    }
}

impl Orchestrator {
    /// Start building an orchestrator around a broker and a processor
    pub fn builder(
        broker: Arc<dyn MessageBroker>,
        processor: Arc<dyn MessageProcessor>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            broker,
            processor,
            validator: Arc::new(AcceptAll),
            recorder: Arc::new(OutcomeCounters::new()),
            dispatch_breaker: None,
            publish_breaker: None,
            retry: None,
            dlq: None,
            config: OrchestratorConfig::default(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Subscribe to `subject_patterns` (plus the configured event subjects
    /// when `enable_event_subscriptions` is set) and start dispatching.
    ///
    /// All-or-nothing: if any subscription fails, those already made are
    /// removed again, the state returns to `Idle` and
    /// [`DeliveryError::Start`] is returned.
    pub async fn start(
        &self,
        subject_patterns: &[String],
        enable_event_subscriptions: bool,
    ) -> DeliveryResult<()> {
        self.transition(OrchestratorState::Idle, OrchestratorState::Starting)?;

        let subjects = self
            .config
            .subscription_subjects(subject_patterns, enable_event_subscriptions);
        let queue_group = self.config.queue_group.clone();
        let mut made: Vec<ActiveSubscription> = Vec::with_capacity(subjects.len());

        for subject in subjects {
            let subscribed = self
                .broker
                .subscribe(&subject, self.dispatch_handler(), queue_group.as_deref())
                .await;

            match subscribed {
                Ok(id) => {
                    debug!(subject = %subject, subscription = %id, "Subscribed");
                    made.push(ActiveSubscription {
                        subject,
                        id,
                        queue_group: queue_group.clone(),
                    });
                }
                Err(e) => {
                    error!(
                        subject = %subject,
                        error = %e,
                        rollback = made.len(),
                        "Subscription failed, rolling back start"
                    );
                    self.rollback(made).await;
                    self.set_state(OrchestratorState::Idle);
                    return Err(DeliveryError::Start { subject, source: e });
                }
            }
        }

        let count = made.len();
        *self.subscriptions.write() = made;
        self.set_state(OrchestratorState::Running);
        info!(
            subscriptions = count,
            broker = self.broker.name(),
            "Orchestrator running"
        );
        Ok(())
    }

    async fn rollback(&self, made: Vec<ActiveSubscription>) {
        for subscription in made {
            if let Err(e) = self.broker.unsubscribe(subscription.id).await {
                warn!(
                    subject = %subscription.subject,
                    subscription = %subscription.id,
                    error = %e,
                    "Rollback unsubscribe failed"
                );
            }
        }
    }

    /// Unsubscribe everything, cancel pending retries and drain in-flight
    /// messages for up to `drain_timeout`.
    ///
    /// Messages still in flight at the deadline are dead-lettered with reason
    /// `shutdown`. Unsubscribe failures are reported but never stop the
    /// teardown; the orchestrator always ends `Stopped`.
    pub async fn stop(&self) -> DeliveryResult<StopReport> {
        self.transition(OrchestratorState::Running, OrchestratorState::Stopping)?;
        info!(in_flight = self.in_flight.len(), "Stopping orchestrator");

        let subscriptions = std::mem::take(&mut *self.subscriptions.write());
        let mut report = StopReport::default();

        for subscription in subscriptions {
            match self.broker.unsubscribe(subscription.id).await {
                Ok(()) => report.unsubscribed += 1,
                Err(e) => {
                    warn!(
                        subject = %subscription.subject,
                        subscription = %subscription.id,
                        error = %e,
                        "Unsubscribe failed, continuing shutdown"
                    );
                    report.unsubscribe_failures.push(UnsubscribeFailure {
                        subject: subscription.subject,
                        id: subscription.id,
                        error: e,
                    });
                }
            }
        }

        self.shutdown.send_replace(true);

        let pending = self.in_flight.len();
        let drained_in_time =
            tokio::time::timeout(self.config.drain_timeout, self.in_flight.wait_empty())
                .await
                .is_ok();

        if !drained_in_time {
            for message in self.in_flight.drain_all() {
                self.dead_letter(
                    &message,
                    DeadLetterReason::Shutdown,
                    "still in flight at drain deadline".to_string(),
                );
                report.force_dead_lettered += 1;
            }
        }
        report.drained = pending.saturating_sub(report.force_dead_lettered);

        self.set_state(OrchestratorState::Stopped);
        info!(
            unsubscribed = report.unsubscribed,
            unsubscribe_failures = report.unsubscribe_failures.len(),
            drained = report.drained,
            force_dead_lettered = report.force_dead_lettered,
            "Orchestrator stopped"
        );
        Ok(report)
    }

    fn transition(&self, from: OrchestratorState, to: OrchestratorState) -> DeliveryResult<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(DeliveryError::InvalidState {
                expected: from,
                actual: *state,
            });
        }
        debug!(from = %from, to = %to, "Orchestrator state change");
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: OrchestratorState) {
        *self.state.write() = to;
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    fn dispatch_handler(&self) -> MessageHandler {
        let this = self.this.clone();
        handler_fn(move |message| {
            let this = this.clone();
            async move {
                if let Some(orchestrator) = this.upgrade() {
                    orchestrator.dispatch(message).await;
                }
            }
        })
    }

    /// Run one inbound message to its terminal outcome.
    ///
    /// Returns the outcome this call recorded, or `None` if `stop()` claimed
    /// the message first.
    pub async fn dispatch(&self, message: Message) -> Option<Outcome> {
        let mut retryable = RetryableMessage::new(message.subject.clone(), message.payload.clone());

        let Some(ticket) = self.admit(&retryable) else {
            let outcome = self.dead_letter(
                &retryable,
                DeadLetterReason::Shutdown,
                "received during shutdown".to_string(),
            );
            return Some(outcome);
        };
        debug!(subject = %message.subject, "Dispatching message");

        if let Err(e) = self.validator.validate(&message) {
            return self.finish(ticket, &retryable, Err((DeadLetterReason::Rejected, e.to_string())));
        }

        retryable.attempt = 1;
        self.in_flight.set_attempt(ticket, 1);

        let result = match self.process_once(&message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if !e.was_attempted() {
                    retryable.attempt = 0;
                }
                self.after_failure(ticket, &message, &mut retryable, e).await
            }
        };

        self.finish(ticket, &retryable, result)
    }

    /// Register a message as in flight unless shutdown has begun.
    ///
    /// The state lock is held across registration: `stop()` either sees the
    /// entry or this call sees `Stopping`.
    fn admit(&self, message: &RetryableMessage) -> Option<InFlightId> {
        let state = self.state.read();
        match *state {
            OrchestratorState::Stopping | OrchestratorState::Stopped => None,
            _ => Some(self.in_flight.register(message.clone())),
        }
    }

    async fn after_failure(
        &self,
        ticket: InFlightId,
        message: &Message,
        retryable: &mut RetryableMessage,
        first_error: CircuitError<ProcessingError>,
    ) -> Result<(), DeadLetter> {
        if !first_error.is_transient() {
            return Err(classify_dispatch_failure(first_error, false));
        }

        let mut shutdown = self.shutdown.subscribe();
        let this = self;
        let subject = message.subject.as_str();
        let retried = self
            .retry
            .retry_message(retryable, first_error, &mut shutdown, move |attempt| {
                this.recorder.record(&Outcome::Retried, subject);
                this.in_flight.set_attempt(ticket, attempt + 1);
                this.process_once(message)
            })
            .await;

        retried.map_err(|failure| classify_dispatch_failure(failure.error, failure.cancelled))
    }

    async fn process_once(&self, message: &Message) -> Result<(), CircuitError<ProcessingError>> {
        let result = self
            .dispatch_breaker
            .call(|| self.processor.process(message))
            .await;
        self.recorder
            .record_circuit_state(self.dispatch_breaker.name(), self.dispatch_breaker.get_state());
        result
    }

    /// Record the terminal outcome if this dispatch still owns the message.
    fn finish(
        &self,
        ticket: InFlightId,
        message: &RetryableMessage,
        result: Result<(), DeadLetter>,
    ) -> Option<Outcome> {
        if self.in_flight.complete(ticket).is_none() {
            debug!(subject = %message.subject, "Outcome already recorded by shutdown");
            return None;
        }

        let outcome = match result {
            Ok(()) => {
                debug!(subject = %message.subject, attempts = message.attempt, "Message processed");
                self.recorder.record(&Outcome::Processed, &message.subject);
                Outcome::Processed
            }
            Err((reason, error)) => self.dead_letter(message, reason, error),
        };
        Some(outcome)
    }

    fn dead_letter(&self, message: &RetryableMessage, reason: DeadLetterReason, error: String) -> Outcome {
        self.dlq
            .enqueue(DeadLetterEntry::from_message(message, reason, error));
        let outcome = Outcome::DeadLettered(reason);
        self.recorder.record(&outcome, &message.subject);
        outcome
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Publish through the publish breaker and retry handler.
    ///
    /// On failure the message is dead-lettered (`circuit_open` or
    /// `publish_failed`) and the error is returned. A publish still waiting
    /// between attempts when `stop()` runs is dead-lettered as `shutdown`.
    pub async fn publish(&self, subject: &str, payload: Value) -> DeliveryResult<()> {
        let mut message = RetryableMessage::new(subject, payload.clone());

        let Some(ticket) = self.admit(&message) else {
            self.dead_letter(
                &message,
                DeadLetterReason::Shutdown,
                "published during shutdown".to_string(),
            );
            return Err(DeliveryError::ShuttingDown);
        };

        message.attempt = 1;
        self.in_flight.set_attempt(ticket, 1);

        let result = match self.publish_once(subject, payload.clone()).await {
            Ok(()) => Ok(()),
            Err(first_error) => {
                if !first_error.was_attempted() {
                    message.attempt = 0;
                }
                let mut shutdown = self.shutdown.subscribe();
                let this = self;
                self.retry
                    .retry_message(&mut message, first_error, &mut shutdown, move |attempt| {
                        this.recorder.record(&Outcome::Retried, subject);
                        this.in_flight.set_attempt(ticket, attempt + 1);
                        this.publish_once(subject, payload.clone())
                    })
                    .await
            }
        };

        let failure = result.err();
        let dead_letter = failure.as_ref().map(classify_publish_failure);
        match self.finish(ticket, &message, dead_letter.map_or(Ok(()), Err)) {
            None => Err(DeliveryError::ShuttingDown),
            Some(_) => match failure {
                None => Ok(()),
                Some(failure) if failure.cancelled => Err(DeliveryError::ShuttingDown),
                Some(failure) => Err(delivery_error(failure.error)),
            },
        }
    }

    async fn publish_once(&self, subject: &str, payload: Value) -> Result<(), CircuitError<BrokerError>> {
        let result = self
            .publish_breaker
            .call(|| self.broker.publish(subject, payload))
            .await;
        self.recorder
            .record_circuit_state(self.publish_breaker.name(), self.publish_breaker.get_state());
        result
    }

    /// Re-publish a dead letter to its original subject; removed on success.
    pub async fn replay_dead_letter(&self, id: Uuid) -> DeliveryResult<()> {
        let replayed = self
            .dlq
            .replay(id, |entry| async move {
                self.publish_once(&entry.subject, entry.payload).await
            })
            .await;

        match replayed {
            Ok(()) => Ok(()),
            Err(ReplayError::NotFound(id)) => Err(DeliveryError::DeadLetterNotFound(id)),
            Err(ReplayError::Handler(e)) => Err(delivery_error(e)),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        *self.state.read()
    }

    /// Subscriptions currently owned
    #[must_use]
    pub fn subscriptions(&self) -> Vec<ActiveSubscription> {
        self.subscriptions.read().clone()
    }

    /// Messages between receipt and terminal outcome
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// The dead-letter queue
    #[must_use]
    pub fn dead_letter_queue(&self) -> &Arc<DeadLetterQueue> {
        &self.dlq
    }

    /// The inbound breaker
    #[must_use]
    pub fn dispatch_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.dispatch_breaker
    }

    /// The outbound breaker
    #[must_use]
    pub fn publish_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.publish_breaker
    }

    /// The retry handler
    #[must_use]
    pub fn retry_handler(&self) -> &Arc<RetryHandler> {
        &self.retry
    }

    /// Orchestrator settings
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}

/// Map a failed dispatch to its dead-letter reason.
fn classify_dispatch_failure(error: CircuitError<ProcessingError>, cancelled: bool) -> DeadLetter {
    let reason = match &error {
        _ if cancelled => DeadLetterReason::Shutdown,
        CircuitError::Open { .. } => DeadLetterReason::CircuitOpen,
        CircuitError::Inner(e) if e.is_transient() => DeadLetterReason::RetriesExhausted,
        CircuitError::Inner(_) => DeadLetterReason::Rejected,
    };
    (reason, error.to_string())
}

/// Map a failed publish to its dead-letter reason.
fn classify_publish_failure(failure: &RetryFailure<CircuitError<BrokerError>>) -> DeadLetter {
    match &failure.error {
        e if failure.cancelled => (
            DeadLetterReason::Shutdown,
            format!("publish retry cancelled by shutdown: {e}"),
        ),
        CircuitError::Open { breaker, .. } => {
            (DeadLetterReason::CircuitOpen, format!("circuit '{breaker}' open"))
        }
        CircuitError::Inner(e) => (DeadLetterReason::PublishFailed, e.to_string()),
    }
}

fn delivery_error(error: CircuitError<BrokerError>) -> DeliveryError {
    match error {
        CircuitError::Open {
            breaker, remaining, ..
        } => DeliveryError::CircuitOpen { breaker, remaining },
        CircuitError::Inner(e) => DeliveryError::Broker(e),
    }
}

#[async_trait]
impl DeliveryApi for Orchestrator {
    async fn publish(&self, subject: &str, payload: Value) -> DeliveryResult<()> {
        Orchestrator::publish(self, subject, payload).await
    }

    async fn replay_dead_letter(&self, id: Uuid) -> DeliveryResult<()> {
        Orchestrator::replay_dead_letter(self, id).await
    }

    fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.dlq.list()
    }

    fn state(&self) -> OrchestratorState {
        Orchestrator::state(self)
    }
}
