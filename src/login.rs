//! Login attempt tracking
//!
//! Counts failed logins per username in a bounded, self-expiring cache.
//! Once a username reaches the policy maximum it is refused before its
//! password is even checked, until the entry expires or a successful
//! login evicts it.
//!
//! The counter is process-local and is not persisted; a restart clears
//! every lockout. The administrative `locked` flag on a user record is a
//! separate, durable mechanism.
//!
//! # Usage
//!
//! ```ignore
//! use warden::login::{LoginAttemptTracker, LoginAttemptPolicy};
//!
//! let tracker = LoginAttemptTracker::new(LoginAttemptPolicy::default());
//!
//! if tracker.has_exceeded_max(username) {
//!     return Err(AccountError::LockedOut);
//! }
//!
//! if password_ok {
//!     tracker.evict(username);
//! } else {
//!     tracker.record_failure(username);
//! }
//! ```

use std::time::Duration;

use moka::sync::Cache;

use crate::observability::SecurityEvent;

/// Failed attempts allowed before a username is locked out.
pub const MAX_ATTEMPTS: u32 = 5;

// ============================================================================
// Policy
// ============================================================================

/// Throttling policy for failed logins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttemptPolicy {
    /// Failed attempts before lockout
    pub max_attempts: u32,

    /// Lifetime of a counter from its first failure
    pub attempt_window: Duration,

    /// Maximum number of usernames tracked at once
    pub capacity: u64,
}

impl Default for LoginAttemptPolicy {
    /// 5 attempts, 15 minute window, 10 000 tracked usernames
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            attempt_window: Duration::from_secs(15 * 60),
            capacity: 10_000,
        }
    }
}

impl LoginAttemptPolicy {
    /// Create a new builder
    pub fn builder() -> LoginAttemptPolicyBuilder {
        LoginAttemptPolicyBuilder::default()
    }
}

/// Builder for LoginAttemptPolicy
#[derive(Debug, Clone, Default)]
pub struct LoginAttemptPolicyBuilder {
    policy: LoginAttemptPolicy,
}

impl LoginAttemptPolicyBuilder {
    /// Set maximum failed attempts
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Set how long a counter lives
    pub fn attempt_window(mut self, window: Duration) -> Self {
        self.policy.attempt_window = window;
        self
    }

    /// Set the number of usernames tracked
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.policy.capacity = capacity;
        self
    }

    /// Build the policy
    pub fn build(self) -> LoginAttemptPolicy {
        self.policy
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Concurrent failed-login counter keyed by username.
///
/// Cloning is cheap and clones share the same counters.
#[derive(Clone)]
pub struct LoginAttemptTracker {
    attempts: Cache<String, u32>,
    max_attempts: u32,
}

impl LoginAttemptTracker {
    /// Create a tracker with the given policy
    pub fn new(policy: LoginAttemptPolicy) -> Self {
        let attempts = Cache::builder()
            .max_capacity(policy.capacity)
            .time_to_live(policy.attempt_window)
            .build();

        Self {
            attempts,
            max_attempts: policy.max_attempts,
        }
    }

    /// Create a tracker with the default policy
    pub fn with_default_policy() -> Self {
        Self::new(LoginAttemptPolicy::default())
    }

    /// Record a failed attempt and return the new count.
    ///
    /// Increment and insert happen atomically, so concurrent failures for
    /// the same username are never lost.
    pub fn record_failure(&self, username: &str) -> u32 {
        let count = self
            .attempts
            .entry(username.to_string())
            .and_upsert_with(|existing| {
                existing
                    .map(|entry| entry.into_value().saturating_add(1))
                    .unwrap_or(1)
            })
            .into_value();

        let remaining = self.max_attempts.saturating_sub(count);
        log_login_failure(username, count, remaining);
        if count == self.max_attempts {
            log_account_locked(username, count);
        }

        count
    }

    /// Forget all failures for a username.
    pub fn evict(&self, username: &str) {
        if self.attempts.remove(username).is_some() {
            log_account_unlocked(username);
        }
    }

    /// True once the failure count has reached the policy maximum.
    pub fn has_exceeded_max(&self, username: &str) -> bool {
        self.attempts(username) >= self.max_attempts
    }

    /// Current failure count, zero when untracked or expired.
    pub fn attempts(&self, username: &str) -> u32 {
        self.attempts.get(username).unwrap_or(0)
    }

    /// The configured maximum
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl std::fmt::Debug for LoginAttemptTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAttemptTracker")
            .field("tracked", &self.attempts.entry_count())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

// ============================================================================
// Security Event Logging
// ============================================================================

fn log_login_failure(username: &str, failed_count: u32, remaining: u32) {
    crate::security_event!(
        SecurityEvent::AuthenticationFailure,
        username = %username,
        failed_count = failed_count,
        remaining_attempts = remaining,
        "Login failed"
    );
}

fn log_account_locked(username: &str, failed_count: u32) {
    crate::security_event!(
        SecurityEvent::AccountLocked,
        username = %username,
        failed_count = failed_count,
        "Username locked due to failed login attempts"
    );
}

fn log_account_unlocked(username: &str) {
    crate::security_event!(
        SecurityEvent::AccountUnlocked,
        username = %username,
        "Failed login counter cleared"
    );
}

// ============================================================================
// Tests
// ============================================================================
