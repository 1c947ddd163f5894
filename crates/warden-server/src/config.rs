//! Configuration parsing for warden.toml
//!
//! Every section is optional. Values present in the file override the ones
//! read from the environment. The token signing secret is not part of the
//! schema and only ever comes from `JWT_SECRET`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use warden::observability::{LogFormat, ObservabilityConfig};
use warden::{parse_duration, parse_size, WardenConfig};

use crate::error::{Result, ServerError};

/// Default listen address
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Root configuration structure for warden.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub token: TokenSection,

    /// Paths that bypass the authorization gate
    #[serde(default)]
    pub public_paths: Option<Vec<String>>,

    #[serde(default)]
    pub login: LoginSection,

    #[serde(default)]
    pub images: ImageSection,

    #[serde(default)]
    pub http: HttpSection,

    #[serde(default)]
    pub logging: LoggingSection,

    #[serde(default)]
    pub database: Option<DatabaseSection>,
}

/// Listener settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Address to bind, e.g. "127.0.0.1:8080"
    pub bind: Option<String>,
}

/// Token settings other than the secret
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenSection {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Lifetime, e.g. "7d"
    pub ttl: Option<String>,
    pub header: Option<String>,
    pub response_header: Option<String>,
}

/// Failed-login throttling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginSection {
    pub max_attempts: Option<u32>,
    /// e.g. "15m"
    pub attempt_window: Option<String>,
    pub capacity: Option<u64>,
}

/// Profile image storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSection {
    pub root: Option<PathBuf>,
    pub public_base_url: Option<String>,
    pub avatar_base_url: Option<String>,
    /// e.g. "2MB"
    pub max_size: Option<String>,
}

/// Hardening layers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSection {
    /// e.g. "4MB"
    pub max_request_size: Option<String>,
    /// e.g. "30s"
    pub request_timeout: Option<String>,
    pub cors_origins: Option<Vec<String>>,
    pub security_headers: Option<bool>,
    pub tracing: Option<bool>,
}

/// Logging
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// pretty, json or compact
    pub format: Option<String>,
    /// `RUST_LOG`-style filter
    pub filter: Option<String>,
}

/// PostgreSQL connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    pub url: Option<String>,
}

impl ServerFile {
    /// Load configuration from a file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_str(&content, path)
    }

    /// Parse configuration from a string
    pub fn from_str(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| ServerError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `path` if given, else `warden.toml` when it exists, else nothing.
    pub fn discover(path: Option<&Path>) -> Result<Option<Self>> {
        match path {
            Some(path) if !path.exists() => Err(ServerError::ConfigNotFound {
                path: path.to_path_buf(),
            }),
            Some(path) => Self::from_file(path).map(Some),
            None => {
                let default = Path::new("warden.toml");
                if default.exists() {
                    Self::from_file(default).map(Some)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Overlay file values onto a configuration loaded from the environment.
    pub fn apply(&self, config: &mut WardenConfig) -> Result<()> {
        let token = &self.token;
        if let Some(issuer) = &token.issuer {
            config.token.issuer = issuer.clone();
        }
        if let Some(audience) = &token.audience {
            config.token.audience = audience.clone();
        }
        if let Some(ttl) = &token.ttl {
            config.token.ttl = duration("token.ttl", ttl)?;
        }
        if let Some(header) = &token.header {
            config.token.header = header.clone();
        }
        if let Some(header) = &token.response_header {
            config.token.response_header = header.clone();
        }

        if let Some(paths) = &self.public_paths {
            config.public_paths = paths.clone();
        }

        let login = &self.login;
        if let Some(max) = login.max_attempts {
            config.login.max_attempts = max;
        }
        if let Some(window) = &login.attempt_window {
            config.login.attempt_window = duration("login.attempt_window", window)?;
        }
        if let Some(capacity) = login.capacity {
            config.login.capacity = capacity;
        }

        let images = &self.images;
        if let Some(root) = &images.root {
            config.images.root = root.clone();
        }
        if let Some(url) = &images.public_base_url {
            config.images.public_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = &images.avatar_base_url {
            config.images.avatar_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(size) = &images.max_size {
            config.images.max_size = size_value("images.max_size", size)?;
        }

        let http = &self.http;
        if let Some(size) = &http.max_request_size {
            config.http.max_request_size = size_value("http.max_request_size", size)?;
        }
        if let Some(timeout) = &http.request_timeout {
            config.http.request_timeout = duration("http.request_timeout", timeout)?;
        }
        if let Some(origins) = &http.cors_origins {
            config.http.cors_origins = origins.clone();
        }
        if let Some(enabled) = http.security_headers {
            config.http.security_headers_enabled = enabled;
        }
        if let Some(enabled) = http.tracing {
            config.http.tracing_enabled = enabled;
        }

        config.validate()?;
        Ok(())
    }

    /// Overlay the logging section onto an environment-derived config.
    pub fn apply_logging(&self, config: &mut ObservabilityConfig) -> Result<()> {
        if let Some(format) = &self.logging.format {
            config.log_format = log_format(format)?;
        }
        if let Some(filter) = &self.logging.filter {
            config.log_filter = filter.clone();
        }
        Ok(())
    }

    /// Bind address from the file, if any
    pub fn bind(&self) -> Option<&str> {
        self.server.bind.as_deref()
    }

    /// Database URL from the file, if any
    pub fn database_url(&self) -> Option<&str> {
        self.database.as_ref().and_then(|db| db.url.as_deref())
    }
}

/// Parse a log format name.
pub fn log_format(value: &str) -> Result<LogFormat> {
    value
        .parse()
        .map_err(|message: String| ServerError::invalid("logging.format", message))
}

fn duration(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| ServerError::invalid(field, e.to_string()))
}

fn size_value(field: &str, value: &str) -> Result<usize> {
    parse_size(value).map_err(|e| ServerError::invalid(field, e.to_string()))
}
