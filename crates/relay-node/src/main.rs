//! # Relay Node
//!
//! Runs the delivery orchestrator on the bundled in-memory broker until
//! Ctrl+C, then drains and exits.
//!
//! Configuration comes from `RELAY_*` environment variables (see
//! `relay_node::container::config`); telemetry from `OTEL_*` / `RELAY_LOG_*`.

use std::sync::Arc;

use anyhow::{Context, Result};
use relay_node::{load_config, RelayRuntime};
use relay_telemetry::{encode_metrics, init_telemetry, PrometheusRecorder, TelemetryConfig};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .await
        .context("Failed to initialize telemetry")?;

    let config = load_config().context("Failed to load configuration")?;
    let recorder = PrometheusRecorder::global().context("Failed to register metrics")?;

    let runtime = RelayRuntime::new(config, Arc::new(recorder))?;
    runtime.start().await?;

    info!("Relay is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    let report = runtime.shutdown().await?;
    info!(
        unsubscribed = report.unsubscribed,
        unsubscribe_failures = report.unsubscribe_failures.len(),
        drained = report.drained,
        force_dead_lettered = report.force_dead_lettered,
        "Relay stopped"
    );

    if let Ok(metrics) = encode_metrics() {
        debug!(metrics = %metrics, "Final metrics");
    }
    Ok(())
}
