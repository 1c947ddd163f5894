//! User records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::role::Role;

/// Per-user search preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    pub keyword: String,
    pub language: String,
    pub call_time: i32,
}

/// A stored account.
///
/// `authorities` mirrors `role` and is only ever written through
/// [`User::assign_role`]. The password hash is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store-assigned key
    pub id: i64,
    /// Public 10-digit identifier
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "userName")]
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub profile_image_url: String,
    pub last_login_date: Option<DateTime<Utc>>,
    /// The login before the most recent one
    pub last_login_date_display: Option<DateTime<Utc>>,
    pub join_date: DateTime<Utc>,
    pub role: Role,
    pub authorities: Vec<String>,
    #[serde(rename = "isActive")]
    pub active: bool,
    #[serde(rename = "isNotLocked")]
    pub not_locked: bool,
    pub preference: Option<Preference>,
}

impl User {
    /// Set the role and replace the authorities with the role's set.
    pub fn assign_role(&mut self, role: Role) {
        self.role = role;
        self.authorities = role.authority_list();
    }

    /// Shift the current login into the display slot and stamp `now`.
    pub fn record_login(&mut self, now: DateTime<Utc>) {
        self.last_login_date_display = self.last_login_date;
        self.last_login_date = Some(now);
    }

    /// Whether the administrative lock is set
    pub fn is_locked(&self) -> bool {
        !self.not_locked
    }
}

/// Fields supplied when a user is created; the store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub profile_image_url: String,
    pub join_date: DateTime<Utc>,
    pub role: Role,
    pub active: bool,
    pub not_locked: bool,
}

impl NewUser {
    /// Materialize with the given key. Authorities come from the role.
    pub fn into_user(self, id: i64) -> User {
        User {
            id,
            user_id: self.user_id,
            first_name: self.first_name,
            last_name: self.last_name,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            profile_image_url: self.profile_image_url,
            last_login_date: None,
            last_login_date_display: None,
            join_date: self.join_date,
            role: self.role,
            authorities: self.role.authority_list(),
            active: self.active,
            not_locked: self.not_locked,
            preference: None,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_into_user_derives_authorities() {
        let mut new = fixtures::new_user("alice", "alice@x.com");
        new.role = Role::Admin;
        let user = new.into_user(7);
        assert_eq!(user.id, 7);
        assert_eq!(user.authorities, Role::Admin.authority_list());
        assert!(user.preference.is_none());
    }

    #[test]
    fn test_assign_role_replaces_authorities() {
        let mut user = fixtures::new_user("alice", "alice@x.com").into_user(1);
        user.assign_role(Role::SuperAdmin);
        assert_eq!(user.authorities.len(), 4);
        user.assign_role(Role::User);
        assert_eq!(user.authorities, vec!["analysis".to_string()]);
    }

    #[test]
    fn test_record_login_shifts_previous() {
        let mut user = fixtures::new_user("alice", "alice@x.com").into_user(1);
        let first = Utc::now();
        let second = first + Duration::hours(1);

        user.record_login(first);
        assert_eq!(user.last_login_date, Some(first));
        assert_eq!(user.last_login_date_display, None);

        user.record_login(second);
        assert_eq!(user.last_login_date, Some(second));
        assert_eq!(user.last_login_date_display, Some(first));
    }

    #[test]
    fn test_serialization_hides_password_hash() {
        let user = fixtures::new_user("alice", "alice@x.com").into_user(1);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["userName"], "alice");
        assert_eq!(json["role"], "ROLE_USER");
        assert_eq!(json["isActive"], true);
        assert_eq!(json["isNotLocked"], true);
    }
}
