//! Port implementations used by the relay binary.

pub mod processor;

pub use processor::LoggingProcessor;
