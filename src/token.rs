//! Bearer token issue and verification
//!
//! Tokens are HS512 JWTs carrying the username as `sub` and the user's
//! authority list under `authorities`. Nothing is stored server-side.
//!
//! Two checks are kept apart on purpose. [`TokenCodec::verify`] checks the
//! signature, issuer and audience but not expiry. [`TokenCodec::is_valid`]
//! only looks at the subject and expiry. Callers that authenticate a
//! request must run both.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TokenConfig;

/// Prefix of the `Authorization` header value
pub const TOKEN_PREFIX: &str = "Bearer ";

/// Claim carrying the authority list
pub const AUTHORITIES_CLAIM: &str = "authorities";

/// Token failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Signature does not match the configured key
    #[error("Token can not be verified")]
    InvalidSignature,

    /// `iss` or `aud` differ from the configured values
    #[error("Token can not be verified: {0} mismatch")]
    ClaimMismatch(&'static str),

    /// Not a decodable JWT
    #[error("Token can not be verified: malformed token")]
    Malformed,

    /// `authorities` claim absent
    #[error("Token has no authorities claim")]
    MissingAuthorities,

    /// Signing failed
    #[error("Token could not be issued: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            JwtErrorKind::InvalidSignature => TokenError::InvalidSignature,
            JwtErrorKind::InvalidIssuer => TokenError::ClaimMismatch("issuer"),
            JwtErrorKind::InvalidAudience => TokenError::ClaimMismatch("audience"),
            _ => TokenError::Malformed,
        }
    }
}

/// Registered and private claims of an issued token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorities: Option<Vec<String>>,
}

// Minimal view used by the expiry check, which must not depend on any
// other claim being well formed.
#[derive(Deserialize)]
struct ExpiryOnly {
    exp: i64,
}

/// Signs and checks tokens with a single HMAC key.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: ChronoDuration,
}

impl TokenCodec {
    /// Build a codec from configuration.
    pub fn new(config: &TokenConfig) -> Self {
        let secret = config.secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: ChronoDuration::from_std(config.ttl).unwrap_or(ChronoDuration::days(7)),
        }
    }

    /// Issue a token for `username` valid from now.
    pub fn issue(&self, username: &str, authorities: &[String]) -> Result<String, TokenError> {
        self.issue_at(username, authorities, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        username: &str,
        authorities: &[String],
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: username.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            authorities: Some(authorities.to_vec()),
        };

        encode(&Header::new(Algorithm::HS512), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Check signature, issuer and audience and return the claims.
    ///
    /// An expired but otherwise genuine token verifies successfully.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }

    /// Whether `exp` lies in the past. Unreadable tokens count as expired.
    ///
    /// The signature is not checked here.
    pub fn is_expired(&self, token: &str) -> bool {
        self.is_expired_at(token, Utc::now())
    }

    /// [`TokenCodec::is_expired`] against a fixed clock.
    pub fn is_expired_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        match decode::<ExpiryOnly>(token, &self.decoding, &validation) {
            Ok(data) => data.claims.exp < now.timestamp(),
            Err(_) => true,
        }
    }

    /// Non-empty subject and not expired. The signature is not checked here.
    pub fn is_valid(&self, username: &str, token: &str) -> bool {
        !username.is_empty() && !self.is_expired(token)
    }

    /// Verified authority list.
    pub fn extract_authorities(&self, token: &str) -> Result<Vec<String>, TokenError> {
        self.verify(token)?
            .authorities
            .ok_or(TokenError::MissingAuthorities)
    }

    /// Verified subject.
    pub fn extract_subject(&self, token: &str) -> Result<String, TokenError> {
        Ok(self.verify(token)?.sub)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Strip the `Bearer ` prefix from a header value.
pub fn strip_bearer(value: &str) -> Option<&str> {
    value
        .strip_prefix(TOKEN_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(secret: &str) -> TokenConfig {
        TokenConfig {
            secret: secret.to_string(),
            ..TokenConfig::default()
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(&config("0123456789abcdef0123456789abcdef"))
    }

    fn authorities() -> Vec<String> {
        vec!["user:read".to_string(), "user:update".to_string()]
    }

    #[test]
    fn test_issue_then_verify() {
        let codec = codec();
        let token = codec.issue("alice", &authorities()).unwrap();

        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.iss, "Warden");
        assert_eq!(claims.aud, "Warden Administration");
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
        assert_eq!(codec.extract_subject(&token).unwrap(), "alice");
        assert_eq!(codec.extract_authorities(&token).unwrap(), authorities());
        assert!(!codec.is_expired(&token));
        assert!(codec.is_valid("alice", &token));
    }

    #[test]
    fn test_expired_token_is_invalid_but_still_verifies() {
        let codec = codec();
        let issued = Utc::now() - ChronoDuration::days(8);
        let token = codec.issue_at("alice", &authorities(), issued).unwrap();

        assert!(codec.is_expired(&token));
        assert!(!codec.is_valid("alice", &token));
        assert!(codec.verify(&token).is_ok());
    }

    #[test]
    fn test_expiry_ignores_signature() {
        let other = TokenCodec::new(&config("ffffffffffffffffffffffffffffffff"));
        let stale = other
            .issue_at("alice", &authorities(), Utc::now() - ChronoDuration::days(30))
            .unwrap();
        let fresh = other.issue("alice", &authorities()).unwrap();

        let codec = codec();
        assert!(codec.is_expired(&stale));
        assert!(!codec.is_valid("alice", &stale));
        assert!(!codec.is_expired(&fresh));
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let other = TokenCodec::new(&config("ffffffffffffffffffffffffffffffff"));
        let codec = codec();

        let fresh = other.issue("alice", &authorities()).unwrap();
        let stale = other
            .issue_at("alice", &authorities(), Utc::now() - ChronoDuration::days(30))
            .unwrap();

        assert_eq!(codec.verify(&fresh), Err(TokenError::InvalidSignature));
        assert_eq!(codec.verify(&stale), Err(TokenError::InvalidSignature));
        assert!(codec.extract_authorities(&fresh).is_err());
    }

    #[test]
    fn test_issuer_and_audience_must_match() {
        let secret = "0123456789abcdef0123456789abcdef";
        let mut foreign = config(secret);
        foreign.issuer = "Someone Else".to_string();
        let token = TokenCodec::new(&foreign).issue("alice", &[]).unwrap();
        assert_eq!(codec().verify(&token), Err(TokenError::ClaimMismatch("issuer")));

        let mut foreign = config(secret);
        foreign.audience = "Other Audience".to_string();
        let token = TokenCodec::new(&foreign).issue("alice", &[]).unwrap();
        assert_eq!(codec().verify(&token), Err(TokenError::ClaimMismatch("audience")));
    }

    #[test]
    fn test_garbage_is_expired_and_malformed() {
        let codec = codec();
        assert!(codec.is_expired("not.a.token"));
        assert!(!codec.is_valid("alice", "not.a.token"));
        assert_eq!(codec.verify("not.a.token"), Err(TokenError::Malformed));
    }

    #[test]
    fn test_empty_subject_is_invalid() {
        let codec = codec();
        let token = codec.issue("", &authorities()).unwrap();
        assert!(!codec.is_valid("", &token));
    }

    #[test]
    fn test_custom_ttl() {
        let mut cfg = config("0123456789abcdef0123456789abcdef");
        cfg.ttl = Duration::from_secs(60);
        let codec = TokenCodec::new(&cfg);
        let now = Utc::now();
        let token = codec.issue_at("alice", &[], now).unwrap();

        assert!(!codec.is_expired_at(&token, now + ChronoDuration::seconds(59)));
        assert!(codec.is_expired_at(&token, now + ChronoDuration::seconds(61)));
    }

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc.def"), Some("abc.def"));
        assert_eq!(strip_bearer("Basic abc"), None);
        assert_eq!(strip_bearer("Bearer "), None);
    }
}
