//! Roles and the authorities they grant
//!
//! The mapping is fixed at compile time. A user's authority list is always
//! copied from [`Role::authorities`] when the role is assigned and is never
//! edited on its own.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Read any user record
pub const USER_READ: &str = "user:read";
/// Create users
pub const USER_CREATE: &str = "user:create";
/// Modify users
pub const USER_UPDATE: &str = "user:update";
/// Remove users
pub const USER_DELETE: &str = "user:delete";
/// Use the analysis features; granted to every regular user
pub const ANALYSIS: &str = "analysis";

const USER_AUTHORITIES: &[&str] = &[ANALYSIS];
const ASSISTANT_AUTHORITIES: &[&str] = &[USER_READ, USER_UPDATE];
const ADMIN_AUTHORITIES: &[&str] = &[USER_READ, USER_CREATE, USER_UPDATE];
const SUPER_ADMIN_AUTHORITIES: &[&str] = &[USER_READ, USER_CREATE, USER_UPDATE, USER_DELETE];

/// Closed set of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Regular account created by self-registration
    #[default]
    User,
    /// Support staff
    Assistant,
    /// Administrator
    Admin,
    /// Administrator who may also delete users
    SuperAdmin,
}

impl Role {
    /// Every role, lowest privilege first
    pub const ALL: [Role; 4] = [Role::User, Role::Assistant, Role::Admin, Role::SuperAdmin];

    /// Authorities granted by this role
    pub fn authorities(self) -> &'static [&'static str] {
        match self {
            Role::User => USER_AUTHORITIES,
            Role::Assistant => ASSISTANT_AUTHORITIES,
            Role::Admin => ADMIN_AUTHORITIES,
            Role::SuperAdmin => SUPER_ADMIN_AUTHORITIES,
        }
    }

    /// Owned copy of [`Role::authorities`] for storing on a user
    pub fn authority_list(self) -> Vec<String> {
        self.authorities().iter().map(|a| a.to_string()).collect()
    }

    /// Wire name, e.g. `ROLE_SUPER_ADMIN`
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "ROLE_USER",
            Role::Assistant => "ROLE_ASSISTANT",
            Role::Admin => "ROLE_ADMIN",
            Role::SuperAdmin => "ROLE_SUPER_ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown role name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct InvalidRole(pub String);

impl FromStr for Role {
    type Err = InvalidRole;

    /// Accepts `ROLE_ADMIN`, `role_admin` and `admin` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("ROLE_").unwrap_or(&upper);
        match bare {
            "USER" => Ok(Role::User),
            "ASSISTANT" => Ok(Role::Assistant),
            "ADMIN" => Ok(Role::Admin),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            _ => Err(InvalidRole(s.to_string())),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
