//! # Relay Configuration
//!
//! Unified configuration for the broker, both circuit breakers, the retry
//! policy, the orchestrator and the dead-letter queue.
//!
//! Every field has a default; `RELAY_*` environment variables override them
//! (see [`load_config`]). Call [`RelayConfig::validate`] before wiring.

use std::time::Duration;

use relay_bus::DEFAULT_MAX_PAYLOAD_BYTES;
use relay_delivery::OrchestratorConfig;
use relay_resilience::{CircuitBreakerConfig, RetryConfig};
use thiserror::Error;

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Broker settings.
    pub broker: BrokerSettings,
    /// Breaker protecting the message processor.
    pub dispatch_breaker: CircuitBreakerConfig,
    /// Breaker protecting `broker.publish`.
    pub publish_breaker: CircuitBreakerConfig,
    /// Retry policy shared by dispatch and publish.
    pub retry: RetryConfig,
    /// Subscriptions and drain behaviour.
    pub orchestrator: OrchestratorConfig,
    /// Subscribe to `orchestrator.event_subjects` as well.
    pub enable_event_subscriptions: bool,
    /// Dead-letter queue settings.
    pub dlq: DlqSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            dispatch_breaker: CircuitBreakerConfig::default(),
            publish_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            orchestrator: OrchestratorConfig {
                subjects: vec!["relay.>".to_string()],
                ..OrchestratorConfig::default()
            },
            enable_event_subscriptions: false,
            dlq: DlqSettings::default(),
        }
    }
}

/// Broker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Largest accepted payload (serialized JSON bytes).
    pub max_payload_bytes: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Dead-letter queue configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlqSettings {
    /// Log every remaining dead letter on shutdown.
    pub dump_on_shutdown: bool,
}

impl Default for DlqSettings {
    fn default() -> Self {
        Self {
            dump_on_shutdown: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("{var}: cannot parse '{value}'")]
    InvalidValue {
        /// Variable name
        var: String,
        /// Raw value
        value: String,
    },

    /// A breaker threshold is zero.
    #[error("{breaker} breaker: {field} must be at least 1")]
    ZeroThreshold {
        /// `dispatch` or `publish`
        breaker: &'static str,
        /// Offending field
        field: &'static str,
    },

    /// `retry.max_attempts` is zero.
    #[error("retry: max_attempts must be at least 1")]
    ZeroAttempts,

    /// `retry.max_delay` is below `retry.base_delay`.
    #[error("retry: max_delay ({max_ms}ms) is below base_delay ({base_ms}ms)")]
    DelayOrder {
        /// Base delay in milliseconds
        base_ms: u128,
        /// Max delay in milliseconds
        max_ms: u128,
    },

    /// `retry.exponential_base` is below 1 (or not a number).
    #[error("retry: exponential_base must be >= 1, got {0}")]
    ExponentialBase(f64),

    /// `retry.jitter_factor` is outside [0, 1].
    #[error("retry: jitter_factor must be within [0, 1], got {0}")]
    JitterFactor(f64),

    /// No subject patterns configured.
    #[error("orchestrator: at least one subject pattern is required")]
    NoSubjects,

    /// Payload limit of zero.
    #[error("broker: max_payload_bytes must be at least 1")]
    ZeroPayloadLimit,
}

impl RelayConfig {
    /// Check the configuration for values the components cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.max_payload_bytes == 0 {
            return Err(ConfigError::ZeroPayloadLimit);
        }

        for (breaker, config) in [
            ("dispatch", &self.dispatch_breaker),
            ("publish", &self.publish_breaker),
        ] {
            if config.failure_threshold == 0 {
                return Err(ConfigError::ZeroThreshold {
                    breaker,
                    field: "failure_threshold",
                });
            }
            if config.success_threshold == 0 {
                return Err(ConfigError::ZeroThreshold {
                    breaker,
                    field: "success_threshold",
                });
            }
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if retry.max_delay < retry.base_delay {
            return Err(ConfigError::DelayOrder {
                base_ms: retry.base_delay.as_millis(),
                max_ms: retry.max_delay.as_millis(),
            });
        }
        if retry.exponential_base.is_nan() || retry.exponential_base < 1.0 {
            return Err(ConfigError::ExponentialBase(retry.exponential_base));
        }
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(ConfigError::JitterFactor(retry.jitter_factor));
        }

        if self.orchestrator.subjects.is_empty() {
            return Err(ConfigError::NoSubjects);
        }
        Ok(())
    }
}

/// Load configuration from the process environment.
pub fn load_config() -> Result<RelayConfig, ConfigError> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Load configuration from an arbitrary variable source.
///
/// | Variable | Field |
/// |----------|-------|
/// | `RELAY_MAX_PAYLOAD_BYTES` | `broker.max_payload_bytes` |
/// | `RELAY_DISPATCH_FAILURE_THRESHOLD` / `RELAY_PUBLISH_FAILURE_THRESHOLD` | breaker `failure_threshold` |
/// | `RELAY_DISPATCH_SUCCESS_THRESHOLD` / `RELAY_PUBLISH_SUCCESS_THRESHOLD` | breaker `success_threshold` |
/// | `RELAY_DISPATCH_TIMEOUT_MS` / `RELAY_PUBLISH_TIMEOUT_MS` | breaker `timeout` |
/// | `RELAY_RETRY_MAX_ATTEMPTS` | `retry.max_attempts` |
/// | `RELAY_RETRY_BASE_DELAY_MS` | `retry.base_delay` |
/// | `RELAY_RETRY_MAX_DELAY_MS` | `retry.max_delay` |
/// | `RELAY_RETRY_EXPONENTIAL_BASE` | `retry.exponential_base` |
/// | `RELAY_RETRY_JITTER_FACTOR` | `retry.jitter_factor` |
/// | `RELAY_SUBJECTS` | `orchestrator.subjects` (comma separated) |
/// | `RELAY_EVENT_SUBJECTS` | `orchestrator.event_subjects` (comma separated) |
/// | `RELAY_ENABLE_EVENTS` | `enable_event_subscriptions` |
/// | `RELAY_QUEUE_GROUP` | `orchestrator.queue_group` |
/// | `RELAY_DRAIN_TIMEOUT_MS` | `orchestrator.drain_timeout` |
/// | `RELAY_DLQ_DUMP_ON_SHUTDOWN` | `dlq.dump_on_shutdown` |
pub fn load_config_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<RelayConfig, ConfigError> {
    let env = EnvReader { lookup };
    let mut config = RelayConfig::default();

    env.parse_into("RELAY_MAX_PAYLOAD_BYTES", &mut config.broker.max_payload_bytes)?;

    env.breaker("RELAY_DISPATCH", &mut config.dispatch_breaker)?;
    env.breaker("RELAY_PUBLISH", &mut config.publish_breaker)?;

    env.parse_into("RELAY_RETRY_MAX_ATTEMPTS", &mut config.retry.max_attempts)?;
    env.millis_into("RELAY_RETRY_BASE_DELAY_MS", &mut config.retry.base_delay)?;
    env.millis_into("RELAY_RETRY_MAX_DELAY_MS", &mut config.retry.max_delay)?;
    env.parse_into("RELAY_RETRY_EXPONENTIAL_BASE", &mut config.retry.exponential_base)?;
    env.parse_into("RELAY_RETRY_JITTER_FACTOR", &mut config.retry.jitter_factor)?;

    if let Some(subjects) = env.list("RELAY_SUBJECTS") {
        config.orchestrator.subjects = subjects;
    }
    if let Some(subjects) = env.list("RELAY_EVENT_SUBJECTS") {
        config.orchestrator.event_subjects = subjects;
    }
    env.flag_into("RELAY_ENABLE_EVENTS", &mut config.enable_event_subscriptions);
    if let Some(group) = env.get("RELAY_QUEUE_GROUP").filter(|g| !g.is_empty()) {
        config.orchestrator.queue_group = Some(group);
    }
    env.millis_into("RELAY_DRAIN_TIMEOUT_MS", &mut config.orchestrator.drain_timeout)?;

    env.flag_into("RELAY_DLQ_DUMP_ON_SHUTDOWN", &mut config.dlq.dump_on_shutdown);

    Ok(config)
}

struct EnvReader<L> {
    lookup: L,
}

impl<L: Fn(&str) -> Option<String>> EnvReader<L> {
    fn get(&self, var: &str) -> Option<String> {
        (self.lookup)(var).map(|v| v.trim().to_string())
    }

    fn parse_into<T: std::str::FromStr>(&self, var: &str, target: &mut T) -> Result<(), ConfigError> {
        if let Some(value) = self.get(var) {
            *target = value.parse().map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
            })?;
        }
        Ok(())
    }

    fn millis_into(&self, var: &str, target: &mut Duration) -> Result<(), ConfigError> {
        let mut millis = target.as_millis() as u64;
        self.parse_into(var, &mut millis)?;
        *target = Duration::from_millis(millis);
        Ok(())
    }

    fn flag_into(&self, var: &str, target: &mut bool) {
        if let Some(value) = self.get(var) {
            *target = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    fn list(&self, var: &str) -> Option<Vec<String>> {
        self.get(var).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    fn breaker(&self, prefix: &str, target: &mut CircuitBreakerConfig) -> Result<(), ConfigError> {
        self.parse_into(
            &format!("{prefix}_FAILURE_THRESHOLD"),
            &mut target.failure_threshold,
        )?;
        self.parse_into(
            &format!("{prefix}_SUCCESS_THRESHOLD"),
            &mut target.success_threshold,
        )?;
        self.millis_into(&format!("{prefix}_TIMEOUT_MS"), &mut target.timeout)
    }
}
