//! Error types for the store SDK

use redis::{ErrorKind, RedisError};
use std::time::Duration;

/// Result type alias
pub type Result<T> = std::result::Result<T, TsdbError>;

/// Store client errors
#[derive(Debug, thiserror::Error)]
pub enum TsdbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    IO(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
}

impl TsdbError {
    /// Errors that mean the store could not be reached, as opposed to a
    /// command the store rejected
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            TsdbError::Connection(_) | TsdbError::IO(_) | TsdbError::Timeout(_)
        )
    }

    /// Classify an error reply sent by the server
    pub fn from_server_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("already exists") || lower.contains("already has") {
            TsdbError::AlreadyExists(message.to_string())
        } else if lower.contains("does not exist") {
            TsdbError::KeyNotFound(message.to_string())
        } else {
            TsdbError::Command(message.to_string())
        }
    }
}

impl From<RedisError> for TsdbError {
    fn from(err: RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() {
            return TsdbError::Connection(err.to_string());
        }
        if err.is_timeout() || err.is_io_error() {
            return TsdbError::IO(err.to_string());
        }
        match err.kind() {
            ErrorKind::TypeError => TsdbError::TypeConversion(err.to_string()),
            ErrorKind::InvalidClientConfig => TsdbError::InvalidUrl(err.to_string()),
            _ => TsdbError::from_server_message(&err.to_string()),
        }
    }
}
