//! # Forge Telemetry
//!
//! Structured logging setup for MediaForge.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;

// Re-export main types
pub use logging::{init_logging, LoggingConfig, TelemetryError};
