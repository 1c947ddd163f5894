//! # Warden
//!
//! User-account backend for Axum applications: registration, login with
//! failed-attempt lockout, HS512 bearer tokens, role-based authorities,
//! profile images and password reset.
//!
//! ## Features
//!
//! - **Accounts**: register, administrative create/update/delete, password
//!   reset by mail, preferences
//! - **Tokens**: HS512 JWTs carrying the user's authorities
//! - **Authorization**: per-request gate plus per-route authority guards
//! - **Lockout**: bounded, self-expiring failed-login counters
//! - **Profile Images**: per-user directories with content-type checks
//! - **Hardening**: timeouts, body limits, security headers, CORS
//! - **Storage**: in-memory by default, PostgreSQL with the `postgres` feature
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden::api::{router, AppState};
//! use warden::observability::{init, ObservabilityConfig};
//! use warden::{LogMailer, MemoryUserStore, SecureRouter, WardenConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init(ObservabilityConfig::from_env())?;
//!
//!     let config = WardenConfig::from_env()?;
//!     let state = AppState::new(
//!         config.clone(),
//!         Arc::new(MemoryUserStore::new()),
//!         Arc::new(LogMailer),
//!     )?;
//!     let app = router(state).with_security(&config);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod images;
mod layers;
pub mod login;
pub mod mail;
pub mod model;
pub mod observability;
mod parse;
pub mod password;
pub mod prelude;
pub mod role;
pub mod service;
pub mod store;
pub mod token;
pub mod validation;

// Re-exports
pub use auth::{AuthPrincipal, AuthorizationGate, GateOutcome, PublicPaths, RequiredAuthority};
pub use config::{ConfigError, HttpConfig, ImageConfig, TokenConfig, WardenConfig, WardenConfigBuilder};
pub use error::{AccountError, AppError, ErrorConfig, ErrorKind};
pub use images::{ProfileImage, ProfileImageStore};
pub use layers::SecureRouter;
pub use login::{LoginAttemptPolicy, LoginAttemptTracker, MAX_ATTEMPTS};
pub use mail::{LogMailer, Mailer, MemoryMailer};
pub use model::{NewUser, Preference, User};
pub use observability::ObservabilityConfigBuilder;
pub use parse::{parse_bool, parse_duration, parse_size, ParseValueError};
pub use role::Role;
pub use service::{AccountService, Registration, UserDetails};
pub use store::{MemoryUserStore, StoreError, UserStore};
pub use token::{Claims, TokenCodec, TokenError};

#[cfg(feature = "postgres")]
pub use store::postgres::{create_pool, health_check, DatabaseConfig, PgUserStore, SslMode};
