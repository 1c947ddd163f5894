//! Input validation
//!
//! Request bodies implement [`Validate`] and are extracted with
//! [`ValidatedJson`] or [`ValidatedForm`], which reject bad input with a
//! 400 (unparseable) or 422 (invalid) [`AppError`] before a handler runs.
//!
//! ```ignore
//! impl Validate for RegisterRequest {
//!     fn validate(&self) -> Result<(), ValidationError> {
//!         validate_username(&self.username)?;
//!         validate_email(&self.email)?;
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;

use axum::{
    extract::{FromRequest, Request},
    Form, Json,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::AppError;

/// Longest accepted username
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Longest accepted name or free-text field
pub const MAX_TEXT_LENGTH: usize = 128;

/// Validation error with field context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Field that failed validation
    pub field: String,
    /// Error code for programmatic handling
    pub code: ValidationErrorCode,
    /// Human-readable message
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for a field
    pub fn for_field(
        field: impl Into<String>,
        code: ValidationErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

/// Validation error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    Required,
    TooShort,
    TooLong,
    InvalidCharacters,
    InvalidEmail,
    OutOfRange,
}

impl fmt::Display for ValidationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::Required => "required",
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::InvalidCharacters => "invalid_characters",
            Self::InvalidEmail => "invalid_email",
            Self::OutOfRange => "out_of_range",
        };
        f.write_str(code)
    }
}

/// Types that can check their own fields
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

// ============================================================================
// Validators
// ============================================================================

/// Non-blank
pub fn validate_required(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::for_field(
            field,
            ValidationErrorCode::Required,
            "Field is required",
        ));
    }
    Ok(())
}

/// Character count within `min..=max`
pub fn validate_length(
    value: &str,
    min: usize,
    max: usize,
    field: &str,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min {
        return Err(ValidationError::for_field(
            field,
            ValidationErrorCode::TooShort,
            format!("Must be at least {} characters", min),
        ));
    }
    if len > max {
        return Err(ValidationError::for_field(
            field,
            ValidationErrorCode::TooLong,
            format!("Must be at most {} characters", max),
        ));
    }
    Ok(())
}

/// Letters, digits, `.`, `_` and `-`; never `.` or `..` alone.
///
/// Usernames name image directories, so this also keeps them path-safe.
pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    validate_required(value, "userName")?;
    validate_length(value, 1, MAX_USERNAME_LENGTH, "userName")?;

    let allowed = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !allowed || value == "." || value == ".." {
        return Err(ValidationError::for_field(
            "userName",
            ValidationErrorCode::InvalidCharacters,
            "Only letters, numbers, '.', '_' and '-' allowed",
        ));
    }
    Ok(())
}

/// Pragmatic email shape check; deliverability is not tested.
pub fn validate_email(value: &str) -> Result<(), ValidationError> {
    let invalid = |message: &str| {
        Err(ValidationError::for_field(
            "email",
            ValidationErrorCode::InvalidEmail,
            message,
        ))
    };

    let Some((local, domain)) = value.split_once('@') else {
        return invalid("Invalid email format");
    };
    if domain.contains('@') {
        return invalid("Invalid email format");
    }

    if local.is_empty() || local.len() > 64 {
        return invalid("Invalid email local part");
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return invalid("Invalid email local part");
    }

    if domain.is_empty() || domain.len() > 255 || !domain.contains('.') {
        return invalid("Invalid email domain");
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return invalid("Invalid email domain");
    }
    if !domain.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-') {
        return invalid("Invalid email domain characters");
    }

    Ok(())
}

/// Inclusive numeric bounds
pub fn validate_range<T: PartialOrd + fmt::Display>(
    value: T,
    min: T,
    max: T,
    field: &str,
) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::for_field(
            field,
            ValidationErrorCode::OutOfRange,
            format!("Must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

// ============================================================================
// Extractors
// ============================================================================

/// JSON body that has passed [`Validate`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            tracing::warn!(error = %e, "JSON parsing failed");
            AppError::bad_request("Failed to parse JSON body").with_details(e.body_text())
        })?;

        checked(value).map(ValidatedJson)
    }
}

/// URL-encoded form body that has passed [`Validate`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedForm<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedForm<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(value) = Form::<T>::from_request(req, state).await.map_err(|e| {
            tracing::warn!(error = %e, "Form parsing failed");
            AppError::bad_request("Failed to parse form body").with_details(e.body_text())
        })?;

        checked(value).map(ValidatedForm)
    }
}

fn checked<T: Validate>(value: T) -> Result<T, AppError> {
    if let Err(error) = value.validate() {
        tracing::warn!(
            field = %error.field,
            code = %error.code,
            message = %error.message,
            "Validation failed"
        );
        return Err(error.into());
    }
    Ok(value)
}
