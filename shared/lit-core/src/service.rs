//! Service lifecycle shared by the platform's HTTP services

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use crate::error::Result;

/// Health status for liveness probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub service_id: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Readiness status for readiness probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessStatus {
    pub ready: bool,
    pub dependencies: Vec<DependencyStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub available: bool,
    pub latency_ms: Option<u64>,
}

/// Lifecycle every service on the platform implements
#[async_trait]
pub trait ManagedService: Send + Sync + 'static {
    /// Service identifier (e.g., "is-bitcoin-lit")
    fn service_id(&self) -> &'static str;

    /// Service version
    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Health check - is the service alive?
    async fn health(&self) -> HealthStatus;

    /// Readiness check - are all dependencies available?
    async fn ready(&self) -> ReadinessStatus;

    /// Graceful shutdown
    async fn shutdown(&self) -> Result<()>;

    /// Start serving; returns when the listener stops
    async fn start(&self) -> Result<()>;
}

/// Runs a service until it stops on its own or a shutdown signal arrives
pub struct ServiceRuntime {
    start_time: std::time::Instant,
}

impl ServiceRuntime {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
        }
    }

    /// Run a service with standard lifecycle management
    pub async fn run<S: ManagedService>(service: Arc<S>) -> Result<()> {
        let runtime = Self::new();

        info!(
            service_id = service.service_id(),
            version = service.version(),
            "Starting service"
        );

        let service_clone = service.clone();
        let mut service_handle = tokio::spawn(async move { service_clone.start().await });

        let outcome = tokio::select! {
            joined = &mut service_handle => {
                match joined {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Service task failed: {}", e);
                        Ok(())
                    }
                }
            }
            _ = Self::wait_for_shutdown() => {
                info!("Shutdown signal received, gracefully stopping...");
                service_handle.abort();
                Ok(())
            }
        };

        if let Err(e) = service.shutdown().await {
            warn!("Error during shutdown: {}", e);
        }

        info!(
            uptime_seconds = runtime.start_time.elapsed().as_secs(),
            "Service stopped"
        );

        outcome
    }

    async fn wait_for_shutdown() {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }
}

impl Default for ServiceRuntime {
    fn default() -> Self {
        Self::new()
    }
}
