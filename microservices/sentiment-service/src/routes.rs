//! Router configuration for the sentiment API

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::AppState;

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Metrics
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/stats", get(handlers::stats))
        // Sentiment
        .route("/is-bitcoin-lit", get(handlers::is_bitcoin_lit))
        .route("/is-bitcoin-lit/current", get(handlers::current_hour))
        .route("/refresh", post(handlers::refresh))
        .with_state(state)
}
