//! Warden Prelude - Common imports for applications embedding Warden
//!
//! # Usage
//!
//! ```ignore
//! use warden::prelude::*;
//!
//! let config = WardenConfig::from_env()?;
//! let state = AppState::new(config.clone(), Arc::new(MemoryUserStore::new()), Arc::new(LogMailer))?;
//! let app = router(state).with_security(&config);
//! ```

// =============================================================================
// Configuration and wiring
// =============================================================================

pub use crate::api::{router, AppState};
pub use crate::config::{ConfigError, HttpConfig, ImageConfig, TokenConfig, WardenConfig};
pub use crate::layers::SecureRouter;

// =============================================================================
// Accounts
// =============================================================================

pub use crate::model::{Preference, User};
pub use crate::role::{Role, ANALYSIS, USER_CREATE, USER_DELETE, USER_READ, USER_UPDATE};
pub use crate::service::{AccountService, Registration, UserDetails};

// =============================================================================
// Collaborators
// =============================================================================

pub use crate::mail::{LogMailer, Mailer, MemoryMailer};
pub use crate::store::{MemoryUserStore, UserStore};

#[cfg(feature = "postgres")]
pub use crate::store::postgres::{create_pool, DatabaseConfig, PgUserStore};

// =============================================================================
// Authorization
// =============================================================================

pub use crate::auth::{require_authority, AuthPrincipal, RequiredAuthority};
pub use crate::token::TokenCodec;

// =============================================================================
// Validation
// =============================================================================

pub use crate::validation::{
    validate_email, validate_length, validate_required, validate_username, Validate,
    ValidatedForm, ValidatedJson, ValidationError,
};

// =============================================================================
// Observability
// =============================================================================

pub use crate::observability::{ObservabilityConfig, SecurityEvent};

// =============================================================================
// Error Handling
// =============================================================================

pub use crate::error::{AccountError, AppError, ErrorConfig};
