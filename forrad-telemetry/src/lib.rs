//! # Forrad Telemetry
//!
//! Logging setup and Prometheus export for allocator events.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
