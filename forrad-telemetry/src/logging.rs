//! ## forrad-telemetry::logging
//! **Structured logging with tracing**
//!
//! `RUST_LOG` wins over the configured level when it is set.

use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber.
    ///
    /// Fails if a subscriber is already installed, e.g. when called twice
    /// or from a test harness that set its own.
    pub fn init(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        fmt()
            .with_env_filter(Self::filter(level))
            .with_thread_names(true)
            .try_init()
    }

    fn filter(level: &str) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }
}
