//! # sw-observability
//!
//! Logging and metrics infrastructure for Style Warden.
//!
//! This crate provides structured logging with tracing and metric recording
//! through the `metrics` facade. No exporter is installed here; binaries
//! decide where metrics go.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use metrics::EngineMetrics;
