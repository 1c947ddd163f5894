//! In-process user store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{StoreError, UniqueField, UserStore};
use crate::model::{NewUser, User};

/// User store kept in memory, keyed by id.
///
/// Uniqueness is checked under the write lock.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<BTreeMap<i64, User>>,
    next_id: AtomicI64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

fn conflict(
    users: &BTreeMap<i64, User>,
    id: Option<i64>,
    username: &str,
    email: &str,
) -> Option<UniqueField> {
    users
        .values()
        .filter(|existing| Some(existing.id) != id)
        .find_map(|existing| {
            if existing.username == username {
                Some(UniqueField::Username)
            } else if existing.email == email {
                Some(UniqueField::Email)
            } else {
                None
            }
        })
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().values().find(|u| u.email == email).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.read().values().cloned().collect())
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write();
        if let Some(field) = conflict(&users, None, &user.username, &user.email) {
            return Err(StoreError::Duplicate { field });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let user = user.into_user(id);
        users.insert(id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write();
        if !users.contains_key(&user.id) {
            return Err(StoreError::NotFound(user.username.clone()));
        }
        if let Some(field) = conflict(&users, Some(user.id), &user.username, &user.email) {
            return Err(StoreError::Duplicate { field });
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<(), StoreError> {
        let mut users = self.users.write();
        let id = users
            .values()
            .find(|u| u.username == username)
            .map(|u| u.id)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        users.remove(&id);
        Ok(())
    }
}
