//! HTTP handlers for the sentiment API

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use lit_core::{CurrentPeriod, DependencyStatus, HealthStatus, ReadinessStatus, Summary};
use serde::Deserialize;
use std::time::Instant;

use crate::pipeline::{PipelineStats, RefreshReport};
use crate::upstream::HISTORY_TIME_FORMAT;
use crate::{AppState, Error, Result, SERVICE_ID};

#[derive(Debug, Deserialize)]
pub struct RefreshParams {
    /// Hour to backfill, `YYYY-MM-DD_HH`
    pub hour: Option<String>,
}

// ============================================
// Health & Metrics Handlers
// ============================================

pub fn health_status(state: &AppState) -> HealthStatus {
    HealthStatus {
        healthy: true,
        service_id: SERVICE_ID.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
    }
}

pub async fn readiness(state: &AppState) -> ReadinessStatus {
    let started = Instant::now();
    let store_ok = state.store.ping().await.is_ok();

    ReadinessStatus {
        ready: store_ok,
        dependencies: vec![DependencyStatus {
            name: "store".to_string(),
            available: store_ok,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        }],
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(health_status(&state))
}

pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessStatus>) {
    let status = readiness(&state).await;
    let code = if status.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

pub async fn stats(State(state): State<AppState>) -> Json<PipelineStats> {
    Json(state.pipeline.stats())
}

// ============================================
// Sentiment Handlers
// ============================================

pub async fn is_bitcoin_lit(State(state): State<AppState>) -> Result<Json<Summary>> {
    Ok(Json(state.pipeline.summary().await?))
}

pub async fn current_hour(State(state): State<AppState>) -> Result<Json<CurrentPeriod>> {
    Ok(Json(state.pipeline.current().await?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<RefreshReport>> {
    let hour = params.hour.as_deref().map(parse_hour).transpose()?;
    Ok(Json(state.pipeline.force_refresh(hour).await?))
}

/// Parse `YYYY-MM-DD_HH` as the start of that UTC hour
pub fn parse_hour(raw: &str) -> Result<DateTime<Utc>> {
    let format = format!("{}:%M", HISTORY_TIME_FORMAT);
    NaiveDateTime::parse_from_str(&format!("{}:00", raw), &format)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| Error::InvalidRequest(format!("hour must be YYYY-MM-DD_HH, got {}", raw)))
}
