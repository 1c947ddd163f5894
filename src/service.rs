//! Account operations
//!
//! [`AccountService`] ties the user store, mailer, image store, login
//! attempt tracker and token codec together. Handlers call it and map the
//! returned [`AccountError`] to an HTTP response.
//!
//! Nothing is rolled back: a user persisted before a failed image save or
//! mail delivery stays persisted.

use std::sync::Arc;

use chrono::Utc;

use crate::config::WardenConfig;
use crate::error::AccountError;
use crate::images::{ProfileImage, ProfileImageStore};
use crate::login::LoginAttemptTracker;
use crate::mail::Mailer;
use crate::model::{NewUser, Preference, User};
use crate::observability::SecurityEvent;
use crate::password::{generate_password, generate_user_id, hash_password, verify_password};
use crate::role::Role;
use crate::store::{StoreError, UniqueField, UserStore};
use crate::token::TokenCodec;
use crate::validation::{validate_email, validate_required, validate_username};

/// Self-service registration input
#[derive(Debug, Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
}

/// Administrative create/update input
#[derive(Debug, Clone)]
pub struct UserDetails {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub not_locked: bool,
}

/// Account operations over the configured collaborators
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    images: ProfileImageStore,
    tracker: LoginAttemptTracker,
    tokens: TokenCodec,
}

impl AccountService {
    pub fn new(config: &WardenConfig, store: Arc<dyn UserStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            mailer,
            images: ProfileImageStore::new(&config.images),
            tracker: LoginAttemptTracker::new(config.login.clone()),
            tokens: TokenCodec::new(&config.token),
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub fn images(&self) -> &ProfileImageStore {
        &self.images
    }

    pub fn tracker(&self) -> &LoginAttemptTracker {
        &self.tracker
    }

    // ------------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------------

    /// Check credentials and issue a token.
    ///
    /// Order matters: lockout and disabled checks come before the password
    /// is looked at, so a locked-out user is refused even with the right
    /// password. The tracker is consulted before the store, so known and
    /// unknown usernames are refused alike once they reach the maximum.
    pub async fn login(&self, username: &str, password: &str) -> Result<(User, String), AccountError> {
        if self.tracker.has_exceeded_max(username) {
            return Err(AccountError::LockedOut);
        }

        let Some(mut user) = self.store.find_by_username(username).await? else {
            self.tracker.record_failure(username);
            return Err(AccountError::BadCredentials);
        };

        if user.is_locked() {
            self.tracker.evict(username);
            return Err(AccountError::LockedOut);
        }
        if !user.active {
            return Err(AccountError::AccountDisabled);
        }

        if !verify(password.to_string(), user.password_hash.clone()).await? {
            self.tracker.record_failure(username);
            return Err(AccountError::BadCredentials);
        }

        self.tracker.evict(username);
        user.record_login(Utc::now());
        self.store.save(&user).await?;

        let token = self.tokens.issue(&user.username, &user.authorities)?;

        crate::security_event!(
            SecurityEvent::AuthenticationSuccess,
            username = %user.username,
            role = %user.role,
            "User logged in"
        );

        Ok((user, token))
    }

    // ------------------------------------------------------------------------
    // Account lifecycle
    // ------------------------------------------------------------------------

    /// Create a `ROLE_USER` account and mail its generated password.
    pub async fn register(&self, registration: Registration) -> Result<User, AccountError> {
        let Registration {
            first_name,
            last_name,
            username,
            email,
        } = registration;
        check_identity(&username, &email)?;
        self.validate_new_username_and_email(None, Some(&username), Some(&email))
            .await?;

        let password = generate_password();
        let new_user = NewUser {
            user_id: generate_user_id(),
            first_name,
            last_name,
            profile_image_url: self.images.temporary_url(&username),
            username,
            email,
            password_hash: hash(password.clone()).await?,
            join_date: Utc::now(),
            role: Role::User,
            active: true,
            not_locked: true,
        };

        let user = self.store.insert(new_user).await.map_err(conflict)?;

        crate::security_event!(
            SecurityEvent::UserRegistered,
            username = %user.username,
            role = %user.role,
            "User registered"
        );

        self.mailer
            .send_new_password(&user.first_name, &password, &user.email)
            .await?;
        Ok(user)
    }

    /// Create an account with an explicit role and flags.
    pub async fn add_new_user(
        &self,
        details: UserDetails,
        image: Option<ProfileImage>,
    ) -> Result<User, AccountError> {
        check_identity(&details.username, &details.email)?;
        self.validate_new_username_and_email(None, Some(&details.username), Some(&details.email))
            .await?;

        let password = generate_password();
        let new_user = NewUser {
            user_id: generate_user_id(),
            profile_image_url: self.images.temporary_url(&details.username),
            first_name: details.first_name,
            last_name: details.last_name,
            username: details.username,
            email: details.email,
            password_hash: hash(password.clone()).await?,
            join_date: Utc::now(),
            role: details.role,
            active: details.active,
            not_locked: details.not_locked,
        };

        let mut user = self.store.insert(new_user).await.map_err(conflict)?;

        crate::security_event!(
            SecurityEvent::UserRegistered,
            username = %user.username,
            role = %user.role,
            "User created by administrator"
        );

        if let Some(image) = image {
            self.store_image(&mut user, &image).await?;
        }

        self.mailer
            .send_new_password(&user.first_name, &password, &user.email)
            .await?;
        Ok(user)
    }

    /// Replace the details of `current_username`.
    ///
    /// The new username and email may equal the user's own.
    pub async fn update_user(
        &self,
        current_username: &str,
        details: UserDetails,
        image: Option<ProfileImage>,
    ) -> Result<User, AccountError> {
        check_identity(&details.username, &details.email)?;
        let mut user = self
            .validate_new_username_and_email(
                Some(current_username),
                Some(&details.username),
                Some(&details.email),
            )
            .await?
            .ok_or_else(|| AccountError::UserNotFound(current_username.to_string()))?;

        user.first_name = details.first_name;
        user.last_name = details.last_name;
        user.username = details.username;
        user.email = details.email;
        user.active = details.active;
        user.not_locked = details.not_locked;
        user.assign_role(details.role);
        self.store.save(&user).await.map_err(conflict)?;

        crate::security_event!(
            SecurityEvent::UserModified,
            username = %user.username,
            previous_username = %current_username,
            role = %user.role,
            "User updated"
        );

        if let Some(image) = image {
            self.store_image(&mut user, &image).await?;
        }
        Ok(user)
    }

    /// Remove the user's image folder, then the record.
    pub async fn delete_user(&self, username: &str) -> Result<(), AccountError> {
        let user = self.find_by_username(username).await?;
        self.images.remove_user_folder(&user.username).await?;
        self.store.delete(&user.username).await?;

        crate::security_event!(
            SecurityEvent::UserDeleted,
            username = %user.username,
            "User deleted"
        );
        Ok(())
    }

    /// Generate, store and mail a new password for the account owning `email`.
    pub async fn reset_password(&self, email: &str) -> Result<(), AccountError> {
        let mut user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or_else(|| AccountError::EmailNotFound(email.to_string()))?;

        let password = generate_password();
        user.password_hash = hash(password.clone()).await?;
        self.store.save(&user).await?;

        crate::security_event!(
            SecurityEvent::PasswordReset,
            username = %user.username,
            "Password reset"
        );

        self.mailer
            .send_new_password(&user.first_name, &password, &user.email)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------------

    pub async fn update_profile_image(
        &self,
        username: &str,
        image: ProfileImage,
    ) -> Result<User, AccountError> {
        let mut user = self.find_by_username(username).await?;
        self.store_image(&mut user, &image).await?;
        Ok(user)
    }

    pub async fn update_preference(
        &self,
        username: &str,
        preference: Preference,
    ) -> Result<User, AccountError> {
        let mut user = self.find_by_username(username).await?;
        user.preference = Some(preference);
        self.store.save(&user).await?;
        Ok(user)
    }

    async fn store_image(&self, user: &mut User, image: &ProfileImage) -> Result<(), AccountError> {
        user.profile_image_url = self.images.save(&user.username, image).await?;
        self.store.save(user).await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn find_by_username(&self, username: &str) -> Result<User, AccountError> {
        self.store
            .find_by_username(username)
            .await?
            .ok_or_else(|| AccountError::UserNotFound(username.to_string()))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<User, AccountError> {
        self.store
            .find_by_email(email)
            .await?
            .ok_or_else(|| AccountError::EmailNotFound(email.to_string()))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AccountError> {
        Ok(self.store.list().await?)
    }

    /// Check that a username and email are free.
    ///
    /// With `current_username` set, the record it names is returned and
    /// collisions with that same record are allowed. Without it, any
    /// existing holder is a collision and `None` is returned.
    pub async fn validate_new_username_and_email(
        &self,
        current_username: Option<&str>,
        new_username: Option<&str>,
        new_email: Option<&str>,
    ) -> Result<Option<User>, AccountError> {
        let by_username = match new_username {
            Some(username) => self.store.find_by_username(username).await?,
            None => None,
        };
        let by_email = match new_email {
            Some(email) => self.store.find_by_email(email).await?,
            None => None,
        };

        let current = match current_username.filter(|name| !name.trim().is_empty()) {
            Some(name) => Some(self.find_by_username(name).await?),
            None => None,
        };
        let current_id = current.as_ref().map(|user| user.id);

        if by_username.is_some_and(|other| Some(other.id) != current_id) {
            return Err(AccountError::UsernameExists);
        }
        if by_email.is_some_and(|other| Some(other.id) != current_id) {
            return Err(AccountError::EmailExists);
        }
        Ok(current)
    }
}

impl std::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountService")
            .field("images", &self.images)
            .field("tracker", &self.tracker)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

fn check_identity(username: &str, email: &str) -> Result<(), AccountError> {
    validate_username(username)?;
    validate_required(email, "email")?;
    validate_email(email)?;
    Ok(())
}

// A uniqueness race lost at the store is reported like the pre-check would.
fn conflict(err: StoreError) -> AccountError {
    match err {
        StoreError::Duplicate {
            field: UniqueField::Username,
        } => AccountError::UsernameExists,
        StoreError::Duplicate {
            field: UniqueField::Email,
        } => AccountError::EmailExists,
        other => AccountError::Store(other),
    }
}

// Argon2 runs on the blocking pool.
async fn hash(password: String) -> Result<String, AccountError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AccountError::Task(e.to_string()))?
        .map_err(AccountError::from)
}

async fn verify(password: String, hash: String) -> Result<bool, AccountError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AccountError::Task(e.to_string()))
}
