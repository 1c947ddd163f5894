//! Security event logging
//!
//! Account operations and authorization decisions are logged through
//! [`security_event!`] so every record carries the same `security_event`,
//! `category` and `severity` fields.
//!
//! # Usage
//!
//! ```ignore
//! use warden::observability::{SecurityEvent, security_event};
//!
//! security_event!(
//!     SecurityEvent::AuthenticationFailure,
//!     username = %username,
//!     failed_count = count,
//!     "Login failed"
//! );
//! ```
//!
//! Passwords, password hashes and tokens must never be passed as fields.

use std::fmt;

/// Security-relevant events emitted by the account backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    // Authentication
    /// Credentials accepted and a token issued
    AuthenticationSuccess,
    /// Credentials rejected
    AuthenticationFailure,
    /// Bearer token failed verification or has expired
    TokenRejected,

    // Authorization
    /// Principal holds a required authority
    AccessGranted,
    /// Principal lacks every required authority
    AccessDenied,

    // User management
    /// Self-service registration completed
    UserRegistered,
    /// User created or updated by an administrator, or preferences changed
    UserModified,
    /// User removed
    UserDeleted,
    /// Password regenerated and mailed
    PasswordReset,
    /// Profile image written to storage
    ProfileImageStored,

    // Throttling
    /// Failed-attempt counter reached its maximum
    AccountLocked,
    /// Failed-attempt counter evicted
    AccountUnlocked,

    // System
    /// Server started accepting connections
    SystemStartup,
    /// Server stopped
    SystemShutdown,
    /// Database pool established
    DatabaseConnected,
}

impl SecurityEvent {
    /// Grouping used by log queries
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess
            | Self::AuthenticationFailure
            | Self::TokenRejected => "authentication",

            Self::AccessGranted | Self::AccessDenied => "authorization",

            Self::UserRegistered
            | Self::UserModified
            | Self::UserDeleted
            | Self::PasswordReset
            | Self::ProfileImageStored => "user_management",

            Self::AccountLocked | Self::AccountUnlocked => "security",

            Self::SystemStartup | Self::SystemShutdown | Self::DatabaseConnected => "system",
        }
    }

    /// Severity, which also selects the log level
    pub fn severity(&self) -> Severity {
        match self {
            Self::AccountLocked => Severity::Critical,

            Self::AuthenticationFailure | Self::TokenRejected | Self::AccessDenied => {
                Severity::High
            }

            Self::AuthenticationSuccess
            | Self::UserRegistered
            | Self::UserModified
            | Self::UserDeleted
            | Self::PasswordReset
            | Self::AccountUnlocked => Severity::Medium,

            Self::AccessGranted
            | Self::ProfileImageStored
            | Self::SystemStartup
            | Self::SystemShutdown
            | Self::DatabaseConnected => Severity::Low,
        }
    }

    /// Value of the `security_event` field
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess => "authentication_success",
            Self::AuthenticationFailure => "authentication_failure",
            Self::TokenRejected => "token_rejected",
            Self::AccessGranted => "access_granted",
            Self::AccessDenied => "access_denied",
            Self::UserRegistered => "user_registered",
            Self::UserModified => "user_modified",
            Self::UserDeleted => "user_deleted",
            Self::PasswordReset => "password_reset",
            Self::ProfileImageStored => "profile_image_stored",
            Self::AccountLocked => "account_locked",
            Self::AccountUnlocked => "account_unlocked",
            Self::SystemStartup => "system_startup",
            Self::SystemShutdown => "system_shutdown",
            Self::DatabaseConnected => "database_connected",
        }
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Routine operations
    Low,
    /// Account state changes
    Medium,
    /// Rejected credentials or access
    High,
    /// Brute-force threshold reached
    Critical,
}

impl Severity {
    /// Lowercase label written into the `severity` field
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log a security event with structured fields.
///
/// The severity of the event picks the tracing level: critical maps to
/// `error!`, high to `warn!`, medium to `info!` and low to `debug!`.
///
/// ```ignore
/// security_event!(
///     SecurityEvent::AccessDenied,
///     username = %principal.username(),
///     resource = "/user/delete",
///     "Access denied"
/// );
/// ```
#[macro_export]
macro_rules! security_event {
    ($event:expr, $($field:tt)*) => {{
        let event: $crate::observability::SecurityEvent = $event;
        let (name, category, severity) = (event.name(), event.category(), event.severity());

        match severity {
            $crate::observability::Severity::Critical => ::tracing::error!(
                security_event = name, category, severity = severity.as_str(), $($field)*
            ),
            $crate::observability::Severity::High => ::tracing::warn!(
                security_event = name, category, severity = severity.as_str(), $($field)*
            ),
            $crate::observability::Severity::Medium => ::tracing::info!(
                security_event = name, category, severity = severity.as_str(), $($field)*
            ),
            $crate::observability::Severity::Low => ::tracing::debug!(
                security_event = name, category, severity = severity.as_str(), $($field)*
            ),
        }
    }};
}

pub use security_event;
