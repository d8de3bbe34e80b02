//! Global subscriber installation

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{LogFormat, TelemetryConfig, TelemetryError};

/// Install the global subscriber. Fails if one is already set.
pub fn init_tracing(service_name: &str, config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::TracingInit(format!("bad filter: {}", e)))?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true).with_thread_ids(true))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };
    installed.map_err(|e| TelemetryError::TracingInit(e.to_string()))?;

    tracing::info!(
        service = service_name,
        filter = %config.log_level,
        format = ?config.log_format,
        "Logging initialized"
    );
    Ok(())
}
