//! Error handling
//!
//! Domain failures are [`AccountError`] values. At the HTTP boundary they
//! become an [`AppError`], which picks the status code, logs the failure and
//! renders a JSON body. Internal details (store, mail and filesystem errors)
//! are logged and only returned to clients in development mode.
//!
//! # Usage
//!
//! ```ignore
//! use warden::error::{AppError, Result};
//!
//! async fn find_user(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<User>> {
//!     let user = state.accounts.find_by_username(&name).await?;
//!     Ok(Json(user))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use thiserror::Error;

use crate::images::ImageError;
use crate::mail::MailError;
use crate::password::HashError;
use crate::role::InvalidRole;
use crate::store::StoreError;
use crate::token::TokenError;
use crate::validation::ValidationError;

/// Returned when a request needs a principal and has none, or its token is bad.
pub const FORBIDDEN_MESSAGE: &str = "You need to log in to access this page.";

/// Returned when the principal lacks the required authority.
pub const ACCESS_DENIED_MESSAGE: &str = "You do not have permission to access this page.";

// ============================================================================
// Error Configuration
// ============================================================================

/// Controls how much of an error reaches the client.
#[derive(Debug, Clone)]
pub struct ErrorConfig {
    /// Include internal details in responses. `false` in production.
    pub expose_details: bool,

    /// Log every error turned into a response
    pub log_errors: bool,

    /// Message shown for internal errors
    pub internal_error_message: String,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl ErrorConfig {
    /// Production configuration (details hidden)
    pub fn production() -> Self {
        Self {
            expose_details: false,
            log_errors: true,
            internal_error_message: "An internal error occurred".to_string(),
        }
    }

    /// Development configuration (details shown)
    pub fn development() -> Self {
        Self {
            expose_details: true,
            log_errors: true,
            internal_error_message: "Internal server error".to_string(),
        }
    }

    /// Load from environment
    ///
    /// `RUST_ENV` or `APP_ENV` set to "production" or "prod" selects the
    /// production configuration; anything else selects development.
    pub fn from_env() -> Self {
        let env = std::env::var("RUST_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "production" | "prod" => Self::production(),
            _ => Self::development(),
        }
    }
}

static ERROR_CONFIG: std::sync::OnceLock<ErrorConfig> = std::sync::OnceLock::new();

/// Install the error configuration. Only the first call takes effect.
pub fn init(config: ErrorConfig) {
    let _ = ERROR_CONFIG.set(config);
}

/// Get the current error configuration
pub fn config() -> &'static ErrorConfig {
    ERROR_CONFIG.get_or_init(ErrorConfig::default)
}

// ============================================================================
// Domain Errors
// ============================================================================

/// Failures of account operations
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Username already exists")]
    UsernameExists,

    #[error("Email already exists")]
    EmailExists,

    #[error("No user found by username: {0}")]
    UserNotFound(String),

    #[error("No user found for email: {0}")]
    EmailNotFound(String),

    #[error("Username / password incorrect. Please try again")]
    BadCredentials,

    #[error("Your account has been locked. Please contact administration")]
    LockedOut,

    #[error("Your account has been disabled. If this is an error, please contact administration")]
    AccountDisabled,

    #[error(transparent)]
    InvalidRole(#[from] InvalidRole),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error("background task failed: {0}")]
    Task(String),
}

// ============================================================================
// HTTP Errors
// ============================================================================

/// Error returned from handlers and middleware
#[derive(Debug)]
pub struct AppError {
    /// Determines HTTP status and handling
    pub kind: ErrorKind,
    /// Client-facing message
    pub message: String,
    /// Internal details (logged, exposed only in development)
    pub details: Option<String>,
    /// Original error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Error categories with their HTTP status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 413
    PayloadTooLarge,
    /// 422
    Validation,
    /// 500
    Internal,
}

impl ErrorKind {
    /// Get the HTTP status code for this error kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message was written for clients. Internal messages are replaced.
    pub fn client_safe(&self) -> bool {
        !matches!(self, Self::Internal)
    }
}

impl AppError {
    /// Create a new error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// 400
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// 401
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// 403
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// 404
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// 409
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// 422
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// 500 with source. The source is logged but not exposed.
    pub fn internal(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: message.into(),
            details: Some(source.to_string()),
            source: Some(Box::new(source)),
        }
    }

    /// 500 without a source
    pub fn internal_msg(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// 401 with the fixed log-in message
    pub fn login_required() -> Self {
        Self::unauthorized(FORBIDDEN_MESSAGE)
    }

    /// 403 with the fixed permission message
    pub fn access_denied() -> Self {
        Self::forbidden(ACCESS_DENIED_MESSAGE)
    }

    /// Add internal details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn log(&self) {
        if !config().log_errors {
            return;
        }

        let details = self.details.as_deref().unwrap_or("none");

        match self.kind {
            ErrorKind::Internal => {
                tracing::error!(
                    error_kind = %self.kind,
                    message = %self.message,
                    details = %details,
                    "Internal error"
                );
            }
            ErrorKind::Unauthorized | ErrorKind::Forbidden => {
                tracing::warn!(
                    error_kind = %self.kind,
                    message = %self.message,
                    "Auth error"
                );
            }
            _ => {
                tracing::debug!(
                    error_kind = %self.kind,
                    message = %self.message,
                    "Client error"
                );
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest => write!(f, "bad_request"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::PayloadTooLarge => write!(f, "payload_too_large"),
            Self::Validation => write!(f, "validation_error"),
            Self::Internal => write!(f, "internal_error"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

// ============================================================================
// Error Response
// ============================================================================

/// JSON error body
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Error code, e.g. `conflict`
    pub error: String,
    /// Human-readable message
    pub message: String,
    /// Internal details (development only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let cfg = config();
        let status = self.kind.status_code();

        let message = if cfg.expose_details || self.kind.client_safe() {
            self.message
        } else {
            cfg.internal_error_message.clone()
        };

        let response = ErrorResponse {
            error: self.kind.to_string(),
            message,
            details: if cfg.expose_details { self.details } else { None },
        };

        (status, Json(response)).into_response()
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::UsernameExists | AccountError::EmailExists => {
                AppError::conflict(err.to_string())
            }
            AccountError::UserNotFound(_) | AccountError::EmailNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            AccountError::BadCredentials | AccountError::LockedOut => {
                AppError::unauthorized(err.to_string())
            }
            AccountError::AccountDisabled => AppError::bad_request(err.to_string()),
            AccountError::InvalidRole(e) => AppError::validation(format!("role: {e}")),
            AccountError::Validation(e) => e.into(),
            AccountError::Image(e) => e.into(),
            AccountError::Token(e) => e.into(),
            AccountError::Store(e) => e.into(),
            AccountError::Mail(e) => AppError::internal("Mail delivery failed", e),
            AccountError::Hash(e) => AppError::internal("Password hashing failed", e),
            AccountError::Task(msg) => AppError::internal_msg("Background task failed").with_details(msg),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(_) => AppError::internal("Token could not be issued", err),
            _ => AppError::login_required().with_details(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { .. } => AppError::conflict(err.to_string()),
            StoreError::NotFound(_) => AppError::not_found(err.to_string()),
            _ => AppError::internal("Storage error", err),
        }
    }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::NotAnImageFile(_) | ImageError::InvalidPath(_) => {
                AppError::bad_request(err.to_string())
            }
            ImageError::TooLarge { .. } => AppError::new(ErrorKind::PayloadTooLarge, err.to_string()),
            ImageError::NotFound(_) => AppError::not_found(err.to_string()),
            ImageError::Io(_) => AppError::internal("Image storage error", err),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::validation(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal("IO error", err)
    }
}

/// Result type alias for handlers returning AppError
pub type Result<T> = std::result::Result<T, AppError>;

// ============================================================================
// Tests
// ============================================================================
