//! # Relay Node Library
//!
//! Wiring and lifecycle for the relay binary, exposed for testing.
//! The main entry point is the `main.rs` binary.
//!
//! ## Modular Structure
//!
//! - `container/` - Configuration and dependency injection
//! - `adapters/` - Port implementations (message processor)
//! - `runtime` - Startup and draining shutdown

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod container;
pub mod runtime;

pub use container::{load_config, ConfigError, DeliveryContainer, RelayConfig};
pub use runtime::RelayRuntime;
