//! `/user/*` handlers

use std::collections::HashMap;

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::auth::AuthPrincipal;
use crate::error::{AccountError, AppError, ErrorKind, Result};
use crate::images::ProfileImage;
use crate::model::{Preference, User};
use crate::parse::parse_bool;
use crate::role::Role;
use crate::service::{Registration, UserDetails};
use crate::validation::{
    validate_email, validate_length, validate_range, validate_required, validate_username,
    Validate, ValidatedForm, ValidatedJson, ValidationError, ValidationErrorCode, MAX_TEXT_LENGTH,
};

/// Message sent after a user is deleted
pub const USER_DELETED_SUCCESSFULLY: &str = "User deleted successfully.";

/// Prefix of the message sent after a password reset
pub const EMAIL_SENT: &str = "An email with a new password was sent to: ";

/// Body of operations that return no user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub time_stamp: DateTime<Utc>,
    pub http_status_code: u16,
    pub http_status: String,
    pub reason: String,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: impl Into<String>) -> Self {
        let status = StatusCode::OK;
        let reason = status.canonical_reason().unwrap_or_default().to_ascii_uppercase();
        Self {
            time_stamp: Utc::now(),
            http_status_code: status.as_u16(),
            http_status: reason.clone(),
            reason,
            message: message.into(),
        }
    }
}

// ============================================================================
// Login and registration
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "userName")]
    pub username: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_required(&self.username, "userName")?;
        validate_required(&self.password, "password")?;
        Ok(())
    }
}

/// Returns the user and puts the token in the response header.
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    let (user, token) = state.accounts.login(&input.username, &input.password).await?;
    let value = HeaderValue::from_str(&token)
        .map_err(|e| AppError::internal("Token header could not be built", e))?;

    Ok(([(state.token_response_header.clone(), value)], Json(user)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "userName")]
    pub username: String,
    pub email: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_length(&self.first_name, 1, MAX_TEXT_LENGTH, "firstName")?;
        validate_length(&self.last_name, 1, MAX_TEXT_LENGTH, "lastName")?;
        validate_username(&self.username)?;
        validate_email(&self.email)?;
        Ok(())
    }
}

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<RegisterRequest>,
) -> Result<Json<User>> {
    let user = state
        .accounts
        .register(Registration {
            first_name: input.first_name,
            last_name: input.last_name,
            username: input.username,
            email: input.email,
        })
        .await?;
    Ok(Json(user))
}

// ============================================================================
// Administration
// ============================================================================

pub async fn add_user(State(state): State<AppState>, multipart: Multipart) -> Result<Json<User>> {
    let mut form = UserForm::read(multipart).await?;
    let details = form.details()?;
    let user = state.accounts.add_new_user(details, form.image.take()).await?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<User>> {
    let mut form = UserForm::read(multipart).await?;
    let current = form.required("currentUserName")?;
    let details = form.details()?;
    let user = state
        .accounts
        .update_user(&current, details, form.image.take())
        .await?;
    Ok(Json(user))
}

pub async fn find_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<User>> {
    Ok(Json(state.accounts.find_by_username(&username).await?))
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    Ok(Json(state.accounts.list_users().await?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.accounts.delete_user(&username).await?;
    Ok(Json(MessageResponse::ok(USER_DELETED_SUCCESSFULLY)))
}

// ============================================================================
// Self-service
// ============================================================================

pub async fn reset_password(
    State(state): State<AppState>,
    _principal: AuthPrincipal,
    Path(email): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.accounts.reset_password(&email).await?;
    Ok(Json(MessageResponse::ok(format!("{EMAIL_SENT}{email}"))))
}

pub async fn update_profile_image(
    State(state): State<AppState>,
    _principal: AuthPrincipal,
    multipart: Multipart,
) -> Result<Json<User>> {
    let mut form = UserForm::read(multipart).await?;
    let username = form.required("userName")?;
    let image = form.image.take().ok_or_else(|| {
        ValidationError::for_field("profileImage", ValidationErrorCode::Required, "Field is required")
    })?;

    Ok(Json(state.accounts.update_profile_image(&username, image).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRequest {
    #[serde(rename = "userName")]
    pub username: String,
    pub keyword: String,
    pub language: String,
    pub call_time: i32,
}

impl Validate for PreferenceRequest {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_required(&self.username, "userName")?;
        validate_length(&self.keyword, 0, MAX_TEXT_LENGTH, "keyword")?;
        validate_length(&self.language, 0, MAX_TEXT_LENGTH, "language")?;
        validate_range(self.call_time, 0, i32::MAX, "callTime")?;
        Ok(())
    }
}

pub async fn update_preference(
    State(state): State<AppState>,
    _principal: AuthPrincipal,
    ValidatedForm(input): ValidatedForm<PreferenceRequest>,
) -> Result<Json<User>> {
    let preference = Preference {
        keyword: input.keyword,
        language: input.language,
        call_time: input.call_time,
    };
    Ok(Json(
        state.accounts.update_preference(&input.username, preference).await?,
    ))
}

/// Stored profile images are always served as JPEG.
pub async fn profile_image(
    State(state): State<AppState>,
    Path((username, file_name)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let bytes = state.accounts.images().read(&username, &file_name).await?;
    Ok(([(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"))], bytes))
}

// ============================================================================
// Multipart forms
// ============================================================================

const IMAGE_FIELD: &str = "profileImage";

/// Text fields plus the optional image of a multipart user form
#[derive(Debug, Default)]
struct UserForm {
    fields: HashMap<String, String>,
    image: Option<ProfileImage>,
}

impl UserForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == IMAGE_FIELD {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                // Browsers send an empty part when no file was chosen
                if !bytes.is_empty() || !file_name.is_empty() {
                    form.image = Some(ProfileImage {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    fn required(&self, name: &str) -> std::result::Result<String, ValidationError> {
        let value = self.fields.get(name).map(String::as_str).unwrap_or_default();
        validate_required(value, name)?;
        Ok(value.trim().to_string())
    }

    fn flag(&self, name: &str) -> std::result::Result<bool, ValidationError> {
        parse_bool(&self.required(name)?).map_err(|e| {
            ValidationError::for_field(name, ValidationErrorCode::InvalidCharacters, e.to_string())
        })
    }

    fn details(&self) -> Result<UserDetails> {
        let first_name = self.required("firstName")?;
        let last_name = self.required("lastName")?;
        validate_length(&first_name, 1, MAX_TEXT_LENGTH, "firstName")?;
        validate_length(&last_name, 1, MAX_TEXT_LENGTH, "lastName")?;

        let role: Role = self
            .required("role")?
            .parse()
            .map_err(AccountError::from)?;

        Ok(UserDetails {
            first_name,
            last_name,
            username: self.required("userName")?,
            email: self.required("email")?,
            role,
            active: self.flag("isActive")?,
            not_locked: self.flag("isNotLocked")?,
        })
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    let kind = if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorKind::PayloadTooLarge
    } else {
        ErrorKind::BadRequest
    };
    AppError::new(kind, "Failed to read multipart body").with_details(e.body_text())
}
