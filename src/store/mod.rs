//! User persistence
//!
//! [`UserStore`] is the only way the account service reaches stored users.
//! [`MemoryUserStore`] is always available; [`postgres::PgUserStore`] is
//! compiled with the `postgres` feature.

mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryUserStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{NewUser, User};

/// Unique field of a user record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Username => write!(f, "username"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// Storage failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another record already holds this username or email
    #[error("{field} already in use")]
    Duplicate { field: UniqueField },

    /// No record with this key
    #[error("no stored user '{0}'")]
    NotFound(String),

    /// Backend failure
    #[error("storage backend error: {0}")]
    Backend(String),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persistence of user records.
///
/// Implementations must enforce username and email uniqueness themselves,
/// so that two concurrent inserts can never both succeed.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up by exact username
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Look up by exact email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// All users ordered by id
    async fn list(&self) -> Result<Vec<User>, StoreError>;

    /// Persist a new user and return it with its assigned id
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    /// Overwrite the record with the same id
    async fn save(&self, user: &User) -> Result<(), StoreError>;

    /// Remove by username
    async fn delete(&self, username: &str) -> Result<(), StoreError>;
}
