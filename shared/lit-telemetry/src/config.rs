//! Logging configuration read from the environment

use std::str::FromStr;

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers
    Json,
    /// Multi-line, for a developer terminal
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    /// `LOG_FORMAT` wins over the older `JSON_LOGS` switch; an unknown
    /// format falls back to JSON.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("RUST_LOG").ok(),
            std::env::var("LOG_FORMAT").ok(),
            std::env::var("JSON_LOGS").ok(),
        )
    }

    fn from_vars(
        log_level: Option<String>,
        log_format: Option<String>,
        json_logs: Option<String>,
    ) -> Self {
        let defaults = Self::default();
        let log_format = match (log_format, json_logs) {
            (Some(format), _) => format.parse().unwrap_or(defaults.log_format),
            (None, Some(flag)) if flag == "false" || flag == "0" => LogFormat::Pretty,
            _ => defaults.log_format,
        };

        Self {
            log_level: log_level.unwrap_or(defaults.log_level),
            log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TelemetryConfig::from_vars(None, None, None);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_log_format_precedence() {
        let config = TelemetryConfig::from_vars(None, Some("compact".into()), Some("true".into()));
        assert_eq!(config.log_format, LogFormat::Compact);

        let config = TelemetryConfig::from_vars(None, None, Some("false".into()));
        assert_eq!(config.log_format, LogFormat::Pretty);

        let config = TelemetryConfig::from_vars(Some("debug".into()), Some("xml".into()), None);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_level, "debug");
    }
}
