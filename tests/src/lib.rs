//! # Relay Test Suite
//!
//! Cross-crate scenarios that need more than one crate's public API.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs          # FlakyBroker, scripted processors
//!     ├── lifecycle.rs         # start rollback, stop and drain
//!     ├── resilience_flows.rs  # breaker and retry end to end
//!     └── publish_flows.rs     # outbound path, replay, request/reply
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p relay-tests
//! cargo test -p relay-tests integration::lifecycle::
//! cargo bench -p relay-tests
//! ```

#![allow(dead_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod integration;
