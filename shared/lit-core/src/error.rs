//! Lifecycle errors raised by a running service

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LitError>;

#[derive(Error, Debug)]
pub enum LitError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listener bind or accept loop failure
    #[error("Network error: {0}")]
    Network(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl LitError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Shutdown(_) => "SHUTDOWN_ERROR",
        }
    }
}

impl From<std::io::Error> for LitError {
    fn from(err: std::io::Error) -> Self {
        LitError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_network_errors() {
        let err: LitError =
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use").into();
        assert!(matches!(err, LitError::Network(_)));
        assert_eq!(err.error_code(), "NETWORK_ERROR");
    }
}
