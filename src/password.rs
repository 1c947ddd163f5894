//! Password generation and hashing
//!
//! Users never choose their first password: registration, administrative
//! creation and reset all mail a generated one. Hashes are Argon2id PHC
//! strings.

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use rand::distributions::{Alphanumeric, Uniform};
use rand::rngs::OsRng;
use rand::Rng;
use thiserror::Error;

/// Length of generated passwords
pub const GENERATED_PASSWORD_LENGTH: usize = 10;

/// Length of the public numeric user id
pub const USER_ID_LENGTH: usize = 10;

/// Hashing failure
#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// Random alphanumeric password
pub fn generate_password() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Random string of decimal digits used as the public user id
pub fn generate_user_id() -> String {
    let digits = Uniform::new_inclusive(b'0', b'9');
    OsRng
        .sample_iter(digits)
        .take(USER_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a password with Argon2id and a fresh salt.
pub fn hash_password(password: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError(e.to_string()))
}

/// Check a password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_password_shape() {
        let password = generate_password();
        assert_eq!(password.len(), GENERATED_PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, generate_password());
    }

    #[test]
    fn test_user_id_is_numeric() {
        let id = generate_user_id();
        assert_eq!(id.len(), USER_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cret-Pass").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("s3cret-Pass", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("", ""));
    }
}
