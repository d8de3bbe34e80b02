//! Error types for the sentiment service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lit_tsdb::TsdbError;
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Sentiment service error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Malformed sample: {0}")]
    MalformedSample(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TsdbError> for Error {
    fn from(err: TsdbError) -> Self {
        if err.is_unavailable() {
            Error::StoreUnavailable(err.to_string())
        } else {
            Error::Internal(format!("store: {}", err))
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::UpstreamFetch(_) | Error::MalformedSample(_) => {
                tracing::error!("Upstream error: {}", self);
                (
                    StatusCode::BAD_GATEWAY,
                    "Sentiment feed unavailable".to_string(),
                )
            }
            Error::StoreUnavailable(_) => {
                tracing::error!("Store error: {}", self);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Store unavailable".to_string(),
                )
            }
            Error::Serialization(_) | Error::Config(_) | Error::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
