//! Runtime configuration
//!
//! Every setting has a default except the token signing secret, which must be
//! supplied through `JWT_SECRET` (or the builder) and is never embedded.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::login::LoginAttemptPolicy;
use crate::parse::{
    parse_bool, parse_count, parse_duration, parse_list, parse_size, ParseValueError,
};

/// Minimum accepted length of the HMAC signing secret.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `JWT_SECRET` was not set
    #[error("JWT_SECRET is not set")]
    MissingSecret,

    /// Secret shorter than [`MIN_SECRET_LENGTH`]
    #[error("JWT secret must be at least {min} characters, got {actual}")]
    WeakSecret { min: usize, actual: usize },

    /// A variable could not be parsed
    #[error("{var}: {source}")]
    InvalidValue {
        var: &'static str,
        #[source]
        source: ParseValueError,
    },

    /// A value parsed but is out of range
    #[error("{field}: {message}")]
    OutOfRange { field: &'static str, message: String },
}

// ============================================================================
// Token settings
// ============================================================================

/// Signing and transport settings for bearer tokens.
#[derive(Clone)]
pub struct TokenConfig {
    /// HMAC-SHA512 secret
    pub secret: String,
    /// `iss` claim
    pub issuer: String,
    /// `aud` claim
    pub audience: String,
    /// Token lifetime
    pub ttl: Duration,
    /// Request header carrying `Bearer <token>`
    pub header: String,
    /// Response header carrying a freshly issued token
    pub response_header: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "Warden".to_string(),
            audience: "Warden Administration".to_string(),
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
            header: "Authorization".to_string(),
            response_header: "Jwt-Token".to_string(),
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .field("header", &self.header)
            .field("response_header", &self.response_header)
            .finish()
    }
}

// ============================================================================
// HTTP hardening
// ============================================================================

/// Settings for the hardening layers applied around the router.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Request timeout
    pub request_timeout: Duration,
    /// CORS allowed origins. Empty is same-origin only, `["*"]` allows any.
    pub cors_origins: Vec<String>,
    /// Emit HSTS, CSP, frame and cache headers
    pub security_headers_enabled: bool,
    /// Wrap requests in a `TraceLayer` span
    pub tracing_enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_request_size: 4 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            cors_origins: Vec::new(),
            security_headers_enabled: true,
            tracing_enabled: true,
        }
    }
}

impl HttpConfig {
    /// Relaxed settings for local development.
    pub fn development() -> Self {
        Self {
            max_request_size: 10 * 1024 * 1024,
            request_timeout: Duration::from_secs(60),
            cors_origins: vec!["*".to_string()],
            security_headers_enabled: false,
            tracing_enabled: true,
        }
    }

    /// Check if CORS allows any origin.
    pub fn cors_is_permissive(&self) -> bool {
        self.cors_origins.len() == 1 && self.cors_origins[0] == "*"
    }

    /// Check if CORS is same-origin only.
    pub fn cors_is_restrictive(&self) -> bool {
        self.cors_origins.is_empty()
    }
}

// ============================================================================
// Profile images
// ============================================================================

/// Where profile images live and how their URLs are built.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Root directory; each user gets `<root>/<username>/`
    pub root: PathBuf,
    /// Externally visible base URL of this server
    pub public_base_url: String,
    /// Placeholder avatar service; `<base>/<username>` is assigned on creation
    pub avatar_base_url: String,
    /// Largest accepted upload
    pub max_size: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/user"),
            public_base_url: "http://localhost:8080".to_string(),
            avatar_base_url: "https://robohash.org".to_string(),
            max_size: 2 * 1024 * 1024,
        }
    }
}

// ============================================================================
// Top-level configuration
// ============================================================================

/// Complete backend configuration.
///
/// # Example
///
/// ```ignore
/// use warden::WardenConfig;
///
/// let config = WardenConfig::from_env()?;
///
/// let config = WardenConfig::builder()
///     .jwt_secret(std::env::var("JWT_SECRET")?)
///     .token_ttl(Duration::from_secs(3600))
///     .image_root("/var/lib/warden/user")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// Token settings
    pub token: TokenConfig,
    /// Paths that bypass the authorization gate. A trailing `/**` matches a prefix.
    pub public_paths: Vec<String>,
    /// Failed-login throttling
    pub login: LoginAttemptPolicy,
    /// Profile image storage
    pub images: ImageConfig,
    /// Hardening layers
    pub http: HttpConfig,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            token: TokenConfig::default(),
            public_paths: default_public_paths(),
            login: LoginAttemptPolicy::default(),
            images: ImageConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

/// `/user/login`, `/user/register` and everything under `/user/image/`.
pub fn default_public_paths() -> Vec<String> {
    vec![
        "/user/login".to_string(),
        "/user/register".to_string(),
        "/user/image/**".to_string(),
    ]
}

impl WardenConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `JWT_SECRET`: signing secret, at least 32 characters (required)
    /// - `TOKEN_ISSUER` (default: "Warden"), `TOKEN_AUDIENCE` (default: "Warden Administration")
    /// - `TOKEN_TTL`: e.g. "7d", "12h" (default: "7d")
    /// - `TOKEN_HEADER` (default: "Authorization"), `TOKEN_RESPONSE_HEADER` (default: "Jwt-Token")
    /// - `PUBLIC_PATHS`: comma-separated, `/**` suffix for prefixes
    /// - `LOGIN_MAX_ATTEMPTS` (default: 5), `LOGIN_ATTEMPT_WINDOW` (default: "15m"),
    ///   `LOGIN_TRACKER_CAPACITY` (default: 10000)
    /// - `USER_IMAGE_DIR` (default: "./data/user"), `PUBLIC_BASE_URL`, `AVATAR_BASE_URL`,
    ///   `MAX_IMAGE_SIZE` (default: "2MB")
    /// - `MAX_REQUEST_SIZE` (default: "4MB"), `REQUEST_TIMEOUT` (default: "30s"),
    ///   `CORS_ALLOWED_ORIGINS`, `SECURITY_HEADERS_ENABLED`, `TRACING_ENABLED`
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = env::var("JWT_SECRET").map_err(|_| ConfigError::MissingSecret)?;
        let mut builder = Self::builder().jwt_secret(secret);

        if let Ok(v) = env::var("TOKEN_ISSUER") {
            builder = builder.issuer(v);
        }
        if let Ok(v) = env::var("TOKEN_AUDIENCE") {
            builder = builder.audience(v);
        }
        if let Some(ttl) = env_with("TOKEN_TTL", parse_duration)? {
            builder = builder.token_ttl(ttl);
        }
        if let Ok(v) = env::var("TOKEN_HEADER") {
            builder = builder.token_header(v);
        }
        if let Ok(v) = env::var("TOKEN_RESPONSE_HEADER") {
            builder = builder.token_response_header(v);
        }
        if let Ok(v) = env::var("PUBLIC_PATHS") {
            builder = builder.public_paths(parse_list(&v));
        }

        let mut login = LoginAttemptPolicy::builder();
        if let Some(n) = env_with("LOGIN_MAX_ATTEMPTS", parse_count)? {
            login = login.max_attempts(n as u32);
        }
        if let Some(window) = env_with("LOGIN_ATTEMPT_WINDOW", parse_duration)? {
            login = login.attempt_window(window);
        }
        if let Some(n) = env_with("LOGIN_TRACKER_CAPACITY", parse_count)? {
            login = login.capacity(n as u64);
        }
        builder = builder.login_policy(login.build());

        if let Ok(v) = env::var("USER_IMAGE_DIR") {
            builder = builder.image_root(v);
        }
        if let Ok(v) = env::var("PUBLIC_BASE_URL") {
            builder = builder.public_base_url(v);
        }
        if let Ok(v) = env::var("AVATAR_BASE_URL") {
            builder = builder.avatar_base_url(v);
        }
        if let Some(size) = env_with("MAX_IMAGE_SIZE", parse_size)? {
            builder = builder.max_image_size(size);
        }

        if let Some(size) = env_with("MAX_REQUEST_SIZE", parse_size)? {
            builder = builder.max_request_size(size);
        }
        if let Some(timeout) = env_with("REQUEST_TIMEOUT", parse_duration)? {
            builder = builder.request_timeout(timeout);
        }
        if let Ok(v) = env::var("CORS_ALLOWED_ORIGINS") {
            builder = builder.cors_origins(parse_list(&v));
        }
        if let Some(enabled) = env_with("SECURITY_HEADERS_ENABLED", parse_bool)? {
            builder = builder.security_headers(enabled);
        }
        if let Some(enabled) = env_with("TRACING_ENABLED", parse_bool)? {
            builder = builder.request_tracing(enabled);
        }

        builder.build()
    }

    /// Create a new builder
    pub fn builder() -> WardenConfigBuilder {
        WardenConfigBuilder::default()
    }

    /// Check invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let actual = self.token.secret.chars().count();
        if actual < MIN_SECRET_LENGTH {
            return Err(ConfigError::WeakSecret {
                min: MIN_SECRET_LENGTH,
                actual,
            });
        }
        if self.token.ttl.is_zero() {
            return Err(ConfigError::OutOfRange {
                field: "token.ttl",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.login.max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "login.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.token.header.trim().is_empty() || self.token.response_header.trim().is_empty() {
            return Err(ConfigError::OutOfRange {
                field: "token.header",
                message: "header names must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn env_with<T>(
    var: &'static str,
    parse: impl FnOnce(&str) -> Result<T, ParseValueError>,
) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => parse(&raw)
            .map(Some)
            .map_err(|source| ConfigError::InvalidValue { var, source }),
        Err(_) => Ok(None),
    }
}

/// Builder for [`WardenConfig`]
#[derive(Debug, Clone, Default)]
pub struct WardenConfigBuilder {
    config: WardenConfig,
}

impl WardenConfigBuilder {
    /// Set the token signing secret.
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.token.secret = secret.into();
        self
    }

    /// Set the `iss` claim.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.token.issuer = issuer.into();
        self
    }

    /// Set the `aud` claim.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.config.token.audience = audience.into();
        self
    }

    /// Set the token lifetime.
    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.config.token.ttl = ttl;
        self
    }

    /// Set the request header carrying the bearer token.
    pub fn token_header(mut self, header: impl Into<String>) -> Self {
        self.config.token.header = header.into();
        self
    }

    /// Set the response header carrying an issued token.
    pub fn token_response_header(mut self, header: impl Into<String>) -> Self {
        self.config.token.response_header = header.into();
        self
    }

    /// Replace the public path list.
    pub fn public_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.public_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Set the failed-login policy.
    pub fn login_policy(mut self, policy: LoginAttemptPolicy) -> Self {
        self.config.login = policy;
        self
    }

    /// Set the profile image root directory.
    pub fn image_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.images.root = root.into();
        self
    }

    /// Set the externally visible base URL.
    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.images.public_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the placeholder avatar service URL.
    pub fn avatar_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.images.avatar_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the largest accepted image upload.
    pub fn max_image_size(mut self, size: usize) -> Self {
        self.config.images.max_size = size;
        self
    }

    /// Replace the HTTP hardening settings.
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.config.http = http;
        self
    }

    /// Set maximum request body size in bytes.
    pub fn max_request_size(mut self, size: usize) -> Self {
        self.config.http.max_request_size = size;
        self
    }

    /// Set request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.request_timeout = timeout;
        self
    }

    /// Set CORS allowed origins.
    pub fn cors_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.http.cors_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable security headers.
    pub fn security_headers(mut self, enabled: bool) -> Self {
        self.config.http.security_headers_enabled = enabled;
        self
    }

    /// Enable or disable request tracing.
    pub fn request_tracing(mut self, enabled: bool) -> Self {
        self.config.http.tracing_enabled = enabled;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<WardenConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_defaults() {
        let config = WardenConfig::builder().jwt_secret(SECRET).build().unwrap();
        assert_eq!(config.token.issuer, "Warden");
        assert_eq!(config.token.ttl, Duration::from_secs(604_800));
        assert_eq!(config.token.header, "Authorization");
        assert_eq!(config.token.response_header, "Jwt-Token");
        assert_eq!(config.login.max_attempts, 5);
        assert_eq!(config.public_paths, default_public_paths());
        assert!(config.http.cors_is_restrictive());
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = WardenConfig::builder().jwt_secret("short").build().unwrap_err();
        assert!(matches!(err, ConfigError::WeakSecret { min: 32, actual: 5 }));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = WardenConfig::builder()
            .jwt_secret(SECRET)
            .login_policy(LoginAttemptPolicy::builder().max_attempts(0).build())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { field: "login.max_attempts", .. }));
    }

    #[test]
    fn test_builder_trims_base_urls() {
        let config = WardenConfig::builder()
            .jwt_secret(SECRET)
            .public_base_url("https://accounts.example.com/")
            .avatar_base_url("https://avatars.example.com/")
            .build()
            .unwrap();
        assert_eq!(config.images.public_base_url, "https://accounts.example.com");
        assert_eq!(config.images.avatar_base_url, "https://avatars.example.com");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = WardenConfig::builder().jwt_secret(SECRET).build().unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains(SECRET));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_development_http_is_permissive() {
        let http = HttpConfig::development();
        assert!(http.cors_is_permissive());
        assert!(!http.security_headers_enabled);
    }
}
