//! # Relay Telemetry
//!
//! Observability for the relay: structured logs, Prometheus metrics and,
//! with the `otlp` feature, OpenTelemetry span export.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_telemetry::{init_telemetry, PrometheusRecorder, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).await?;
//!     let recorder = PrometheusRecorder::global()?;
//!     // Hand `recorder` to the orchestrator builder.
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `relay` | Service name in logs and traces |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `http://localhost:4317` | OTLP collector |
//! | `RELAY_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `RELAY_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `RELAY_JSON_LOGS` | `false` | JSON instead of pretty logs |
//! | `RELAY_ENVIRONMENT` | `dev` | Deployment environment |

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
mod metrics;
#[cfg(feature = "otlp")]
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, encode_registry, PrometheusRecorder, CIRCUIT_STATE_METRIC, OUTCOMES_METRIC,
    REGISTRY,
};
#[cfg(feature = "otlp")]
pub use tracing_setup::TracingGuard;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Registry};

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// OTLP pipeline could not be built
    #[error("Failed to initialize OpenTelemetry tracer: {0}")]
    TracerInit(String),

    /// A global subscriber is already installed
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    /// Prometheus collector creation, registration or encoding failed
    #[error("Prometheus metrics error: {0}")]
    MetricsInit(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install the global tracing subscriber.
///
/// Returns a guard that must be held for the lifetime of the application.
/// When dropped, it flushes pending spans (with `otlp`).
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let registry = tracing_subscriber::registry()
        .with(logging::fmt_layer::<Registry>(&config))
        .with(logging::env_filter(&config)?);

    #[cfg(feature = "otlp")]
    let guard = {
        let (otel_layer, tracing_guard) = tracing_setup::otel_layer(&config)?;
        registry
            .with(otel_layer)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;
        TelemetryGuard {
            _tracing: tracing_guard,
        }
    };

    #[cfg(not(feature = "otlp"))]
    let guard = {
        registry
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;
        TelemetryGuard {}
    };

    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        json_logs = config.json_logs,
        otlp = cfg!(feature = "otlp"),
        "Telemetry initialized"
    );

    Ok(guard)
}

/// Guard that keeps telemetry active. Drop to flush and shut down.
pub struct TelemetryGuard {
    #[cfg(feature = "otlp")]
    _tracing: TracingGuard,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}
