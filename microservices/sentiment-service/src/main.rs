//! Is Bitcoin Lit
//!
//! Serves an hourly summary of Bitcoin sentiment and price:
//! - Samples from the SentiCrypt feed persisted into RedisTimeSeries
//! - Hourly roll-ups maintained by compaction rules
//! - Rising/falling/flat trends over the last closed hours
//! - Summary cached with a short TTL in front of the rate-limited feed

#![allow(dead_code)]

mod aggregator;
mod bootstrap;
mod cache;
mod clock;
mod config;
mod error;
mod handlers;
mod ingestion;
mod keys;
mod pipeline;
mod refresh;
mod routes;
mod store;
mod upstream;


use async_trait::async_trait;
use lit_core::{HealthStatus, LitError, ManagedService, ReadinessStatus, ServiceRuntime};
use lit_tsdb::ClientOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;

pub use config::Config;
pub use error::{Error, Result};

use bootstrap::Bootstrap;
use clock::SystemClock;
use keys::KeySpace;
use pipeline::Pipeline;
use store::StoreClient;
use upstream::SentiCryptClient;

pub const SERVICE_ID: &str = "is-bitcoin-lit";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: StoreClient,
    pub started: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lit_telemetry::init(SERVICE_ID)?;

    info!("Starting Is Bitcoin Lit service");

    let config = Config::from_env()?;
    let service = Arc::new(SentimentService::new(config).await?);
    ServiceRuntime::run(service).await?;

    Ok(())
}

pub struct SentimentService {
    state: AppState,
    bind_addr: SocketAddr,
}

impl SentimentService {
    /// Connect to the store and create the series before serving. Any
    /// failure here aborts startup.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let bind_addr = config.bind_address()?;

        let backend = lit_tsdb::open(
            &config.store_url,
            ClientOptions {
                connect_timeout: config.store_timeout(),
            },
        )?;
        let store = StoreClient::new(backend, config.store_timeout(), config.store_retries);

        Bootstrap::new(store.clone(), KeySpace::new(config.key_prefix.clone()))
            .initialize()
            .await?;

        let source = Arc::new(SentiCryptClient::new(
            &config.sentiment_api_url,
            &config.sentiment_history_url,
            config.upstream_timeout(),
        )?);
        let pipeline = Pipeline::new(&config, store.clone(), source, Arc::new(SystemClock));

        info!(
            store = %config.store_url,
            prefix = %config.key_prefix,
            window_hours = config.window_hours,
            single_flight = config.single_flight,
            "Pipeline ready"
        );

        Ok(Self {
            state: AppState {
                pipeline: Arc::new(pipeline),
                store,
                started: Instant::now(),
            },
            bind_addr,
        })
    }
}

#[async_trait]
impl ManagedService for SentimentService {
    fn service_id(&self) -> &'static str {
        SERVICE_ID
    }

    async fn health(&self) -> HealthStatus {
        handlers::health_status(&self.state)
    }

    async fn ready(&self) -> ReadinessStatus {
        handlers::readiness(&self.state).await
    }

    async fn shutdown(&self) -> lit_core::Result<()> {
        info!("Shutting down Is Bitcoin Lit service");
        Ok(())
    }

    async fn start(&self) -> lit_core::Result<()> {
        let app = routes::create_router(self.state.clone());
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!("Is Bitcoin Lit listening on {}", self.bind_addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| LitError::Network(e.to_string()))
    }
}
