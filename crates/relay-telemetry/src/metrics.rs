//! Prometheus metrics for the delivery layer.
//!
//! All metrics follow the naming convention: `relay_<component>_<metric>`
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `relay_delivery_outcomes_total` | Counter | `outcome`, `reason` |
//! | `relay_circuit_state` | Gauge (0 closed, 1 open, 2 half-open) | `breaker` |

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use relay_delivery::{Outcome, OutcomeRecorder};
use relay_resilience::CircuitState;
use tracing::warn;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();
}

/// Name of the outcome counter
pub const OUTCOMES_METRIC: &str = "relay_delivery_outcomes_total";

/// Name of the breaker state gauge
pub const CIRCUIT_STATE_METRIC: &str = "relay_circuit_state";

/// [`OutcomeRecorder`] backed by Prometheus collectors.
#[derive(Clone)]
pub struct PrometheusRecorder {
    outcomes: IntCounterVec,
    circuit_state: IntGaugeVec,
}

impl PrometheusRecorder {
    /// Create the collectors and register them with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, TelemetryError> {
        let outcomes = IntCounterVec::new(
            Opts::new(OUTCOMES_METRIC, "Delivery outcomes by outcome and dead-letter reason"),
            &["outcome", "reason"],
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

        let circuit_state = IntGaugeVec::new(
            Opts::new(
                CIRCUIT_STATE_METRIC,
                "Circuit breaker state (0 closed, 1 open, 2 half-open)",
            ),
            &["breaker"],
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

        registry
            .register(Box::new(outcomes.clone()))
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        registry
            .register(Box::new(circuit_state.clone()))
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

        Ok(Self {
            outcomes,
            circuit_state,
        })
    }

    /// Recorder on the global [`REGISTRY`].
    ///
    /// Only the first call registers; later calls fail with
    /// [`TelemetryError::MetricsInit`]. Clone the returned recorder instead.
    pub fn global() -> Result<Self, TelemetryError> {
        Self::new(&REGISTRY)
    }

    /// Current count for one outcome/reason pair.
    #[must_use]
    pub fn outcome_count(&self, outcome: &str, reason: &str) -> u64 {
        self.outcomes.with_label_values(&[outcome, reason]).get()
    }

    /// Last reported state gauge for a breaker.
    #[must_use]
    pub fn circuit_gauge(&self, breaker: &str) -> i64 {
        self.circuit_state.with_label_values(&[breaker]).get()
    }
}

impl OutcomeRecorder for PrometheusRecorder {
    fn record(&self, outcome: &Outcome, _subject: &str) {
        self.outcomes
            .with_label_values(&[outcome.label(), outcome.reason()])
            .inc();
    }

    fn record_circuit_state(&self, breaker: &str, state: CircuitState) {
        self.circuit_state
            .with_label_values(&[breaker])
            .set(state.as_gauge());
    }
}

/// Encode a registry in the Prometheus text format.
pub fn encode_registry(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Encode the global registry in the Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode_registry(&REGISTRY).inspect_err(|e| warn!(error = %e, "Metrics encoding failed"))
}
