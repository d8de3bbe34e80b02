//! Lit Telemetry
//!
//! Structured logging setup and in-process metrics primitives.

mod config;
mod metrics;
mod tracing_setup;

pub use config::{LogFormat, TelemetryConfig};
pub use metrics::{Counter, Gauge, Histogram, HistogramSnapshot};
pub use tracing_setup::init_tracing;

/// Initialize logging for a service from the environment
pub fn init(service_name: &str) -> Result<(), TelemetryError> {
    let config = TelemetryConfig::from_env();
    init_tracing(service_name, &config)
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),
}
