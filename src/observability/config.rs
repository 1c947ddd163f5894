//! Observability Configuration

use std::env;
use std::str::FromStr;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    #[default]
    Pretty,
    /// JSON format for production/log aggregation
    Json,
    /// Compact single-line format
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}' (expected pretty, json or compact)")),
        }
    }
}

/// Logging configuration applied once at startup
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log output format
    pub log_format: LogFormat,
    /// Log level filter (e.g., "info", "warden=debug,tower_http=info")
    pub log_filter: String,
    /// Include source file and line in each record
    pub with_source_location: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: "info".to_string(),
            with_source_location: true,
        }
    }
}

impl ObservabilityConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LOG_FORMAT`: "pretty", "json", or "compact" (default: "pretty")
    /// - `RUST_LOG`: Log filter directive (default: "info")
    /// - `LOG_SOURCE_LOCATION`: Include file/line (default: "true")
    pub fn from_env() -> Self {
        let log_format = env::var("LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let with_source_location = env::var("LOG_SOURCE_LOCATION")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            log_format,
            log_filter,
            with_source_location,
        }
    }

    /// Create a new configuration builder
    pub fn builder() -> ObservabilityConfigBuilder {
        ObservabilityConfigBuilder::default()
    }
}

/// Builder for ObservabilityConfig
#[derive(Default)]
pub struct ObservabilityConfigBuilder {
    config: ObservabilityConfig,
}

impl ObservabilityConfigBuilder {
    /// Set the log format
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.log_format = format;
        self
    }

    /// Set the log filter
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    /// Include or omit source file and line
    pub fn with_source_location(mut self, enable: bool) -> Self {
        self.config.with_source_location = enable;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ObservabilityConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.log_filter, "info");
        assert!(config.with_source_location);
    }

    #[test]
    fn test_builder() {
        let config = ObservabilityConfig::builder()
            .log_format(LogFormat::Json)
            .log_filter("debug")
            .with_source_location(false)
            .build();

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_filter, "debug");
        assert!(!config.with_source_location);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" compact ".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
