//! Per-request authorization
//!
//! Two layers cooperate:
//!
//! 1. [`authorization_middleware`] runs on every request. It lets `OPTIONS`
//!    and public paths through, turns a valid bearer token into an
//!    [`AuthPrincipal`] stored in the request extensions, and rejects a
//!    present but bad token with 401.
//! 2. [`require_authority`] is attached with `route_layer` to routes that
//!    need a specific authority. No principal gives 401; a principal
//!    without any of the listed authorities gives 403.
//!
//! Handlers that only need *some* authenticated caller take an
//! [`AuthPrincipal`] argument, which rejects with 401 when absent.
//!
//! ```ignore
//! let gate = Arc::new(AuthorizationGate::new(&config, codec)?);
//!
//! let admin = Router::new()
//!     .route("/user/add", post(add_user))
//!     .route_layer(from_fn_with_state(RequiredAuthority::any(&[USER_CREATE]), require_authority));
//!
//! let app = Router::new()
//!     .merge(admin)
//!     .layer(from_fn_with_state(gate, authorization_middleware));
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, HeaderName, Method},
    middleware::Next,
    response::Response,
};

use crate::config::{ConfigError, WardenConfig};
use crate::error::AppError;
use crate::observability::SecurityEvent;
use crate::token::{strip_bearer, TokenCodec, TokenError};

// ============================================================================
// Principal
// ============================================================================

/// Identity reconstructed from a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPrincipal {
    username: String,
    authorities: HashSet<String>,
}

impl AuthPrincipal {
    pub fn new(username: impl Into<String>, authorities: impl IntoIterator<Item = String>) -> Self {
        Self {
            username: username.into(),
            authorities: authorities.into_iter().collect(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn authorities(&self) -> &HashSet<String> {
        &self.authorities
    }

    /// Holds this exact authority
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    /// Holds at least one of these authorities
    pub fn has_any_authority(&self, authorities: &[&str]) -> bool {
        authorities.iter().any(|a| self.has_authority(a))
    }

    fn authority_list(&self) -> String {
        let mut list: Vec<&str> = self.authorities.iter().map(String::as_str).collect();
        list.sort_unstable();
        list.join(",")
    }
}

impl<S> FromRequestParts<S> for AuthPrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthPrincipal>()
            .cloned()
            .ok_or_else(AppError::login_required)
    }
}

/// Log an authority check.
pub fn log_access_decision(principal: &AuthPrincipal, resource: &str, allowed: bool) {
    let event = if allowed {
        SecurityEvent::AccessGranted
    } else {
        SecurityEvent::AccessDenied
    };

    crate::security_event!(
        event,
        username = %principal.username(),
        resource = %resource,
        authorities = %principal.authority_list(),
        "Access decision made"
    );
}

// ============================================================================
// Public paths
// ============================================================================

/// Paths that bypass token checks.
///
/// A pattern ending in `/**` matches its base path and everything below it;
/// any other pattern must match exactly.
#[derive(Debug, Clone, Default)]
pub struct PublicPaths {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl PublicPaths {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            match pattern.strip_suffix("/**") {
                Some(base) => paths.prefixes.push(base.to_string()),
                None => paths.exact.push(pattern.to_string()),
            }
        }
        paths
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path)
            || self.prefixes.iter().any(|base| {
                path.strip_prefix(base.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
    }
}

// ============================================================================
// Gate
// ============================================================================

/// Why a presented token was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRejection {
    /// Signature, issuer, audience or format check failed
    Invalid(TokenError),
    /// Genuine token past its expiry, or without a subject
    Expired,
}

/// Result of evaluating one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// `OPTIONS` or public path; not inspected
    PassThrough,
    /// No bearer token
    Unauthenticated,
    /// Token verified and valid
    Authenticated(AuthPrincipal),
    /// Token present but refused
    Rejected(TokenRejection),
}

/// Turns request headers into a [`GateOutcome`].
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    codec: TokenCodec,
    header: HeaderName,
    public: PublicPaths,
}

impl AuthorizationGate {
    pub fn new(config: &WardenConfig, codec: TokenCodec) -> Result<Self, ConfigError> {
        let header = HeaderName::from_bytes(config.token.header.as_bytes()).map_err(|e| {
            ConfigError::OutOfRange {
                field: "token.header",
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            codec,
            header,
            public: PublicPaths::new(&config.public_paths),
        })
    }

    /// Decide what to do with a request.
    ///
    /// A present token must pass both [`TokenCodec::verify`] and
    /// [`TokenCodec::is_valid`], and must carry an authorities claim.
    pub fn evaluate(&self, method: &Method, path: &str, headers: &HeaderMap) -> GateOutcome {
        if method == Method::OPTIONS || self.public.is_public(path) {
            return GateOutcome::PassThrough;
        }

        let Some(token) = headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .and_then(strip_bearer)
        else {
            return GateOutcome::Unauthenticated;
        };

        let claims = match self.codec.verify(token) {
            Ok(claims) => claims,
            Err(e) => return GateOutcome::Rejected(TokenRejection::Invalid(e)),
        };

        if !self.codec.is_valid(&claims.sub, token) {
            return GateOutcome::Rejected(TokenRejection::Expired);
        }

        let Some(authorities) = claims.authorities else {
            let missing = TokenRejection::Invalid(TokenError::MissingAuthorities);
            return GateOutcome::Rejected(missing);
        };

        GateOutcome::Authenticated(AuthPrincipal::new(claims.sub, authorities))
    }
}

/// Middleware applying [`AuthorizationGate::evaluate`] to every request.
pub async fn authorization_middleware(
    State(gate): State<Arc<AuthorizationGate>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let outcome = gate.evaluate(request.method(), request.uri().path(), request.headers());

    match outcome {
        GateOutcome::PassThrough | GateOutcome::Unauthenticated => {}
        GateOutcome::Authenticated(principal) => {
            request.extensions_mut().insert(principal);
        }
        GateOutcome::Rejected(reason) => {
            let reason = match reason {
                TokenRejection::Invalid(e) => e.to_string(),
                TokenRejection::Expired => "token expired".to_string(),
            };
            crate::security_event!(
                SecurityEvent::TokenRejected,
                path = %request.uri().path(),
                reason = %reason,
                "Bearer token rejected"
            );
            return Err(AppError::login_required());
        }
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Route guard
// ============================================================================

/// Authorities of which a caller needs at least one
#[derive(Debug, Clone, Copy)]
pub struct RequiredAuthority(&'static [&'static str]);

impl RequiredAuthority {
    pub const fn any(authorities: &'static [&'static str]) -> Self {
        Self(authorities)
    }

    pub fn authorities(&self) -> &'static [&'static str] {
        self.0
    }
}

/// Route-level guard enforcing a [`RequiredAuthority`].
pub async fn require_authority(
    State(required): State<RequiredAuthority>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let Some(principal) = request.extensions().get::<AuthPrincipal>() else {
        return Err(AppError::login_required());
    };

    let allowed = principal.has_any_authority(required.authorities());
    log_access_decision(principal, request.uri().path(), allowed);
    if !allowed {
        return Err(AppError::access_denied());
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};

    use crate::role::{Role, USER_DELETE, USER_READ};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn config() -> WardenConfig {
        WardenConfig::builder().jwt_secret(SECRET).build().unwrap()
    }

    fn gate() -> (AuthorizationGate, TokenCodec) {
        let config = config();
        let codec = TokenCodec::new(&config.token);
        (AuthorizationGate::new(&config, codec.clone()).unwrap(), codec)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_public_paths() {
        let paths = PublicPaths::new(["/user/login", "/user/image/**"]);
        assert!(paths.is_public("/user/login"));
        assert!(!paths.is_public("/user/login/extra"));
        assert!(paths.is_public("/user/image"));
        assert!(paths.is_public("/user/image/alice/alice.jpg"));
        assert!(!paths.is_public("/user/images"));
        assert!(!paths.is_public("/user/list"));
    }

    #[test]
    fn test_principal_authorities() {
        let principal = AuthPrincipal::new("admin", Role::Admin.authority_list());
        assert!(principal.has_authority(USER_READ));
        assert!(!principal.has_authority(USER_DELETE));
        assert!(principal.has_any_authority(&[USER_DELETE, USER_READ]));
        assert!(!principal.has_any_authority(&[USER_DELETE]));
        assert!(!principal.has_any_authority(&[]));
    }

    #[test]
    fn test_options_and_public_pass_through() {
        let (gate, _) = gate();
        let headers = bearer("garbage");
        assert_eq!(
            gate.evaluate(&Method::OPTIONS, "/user/list", &headers),
            GateOutcome::PassThrough
        );
        assert_eq!(
            gate.evaluate(&Method::POST, "/user/login", &headers),
            GateOutcome::PassThrough
        );
    }

    #[test]
    fn test_missing_or_non_bearer_header_is_unauthenticated() {
        let (gate, _) = gate();
        assert_eq!(
            gate.evaluate(&Method::GET, "/user/list", &HeaderMap::new()),
            GateOutcome::Unauthenticated
        );

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcjpwdw=="));
        assert_eq!(
            gate.evaluate(&Method::GET, "/user/list", &headers),
            GateOutcome::Unauthenticated
        );
    }

    #[test]
    fn test_valid_token_authenticates() {
        let (gate, codec) = gate();
        let token = codec.issue("admin", &Role::Admin.authority_list()).unwrap();

        match gate.evaluate(&Method::GET, "/user/list", &bearer(&token)) {
            GateOutcome::Authenticated(principal) => {
                assert_eq!(principal.username(), "admin");
                assert!(principal.has_authority(USER_READ));
            }
            other => panic!("expected authenticated, got {other:?}"),
        }
    }

    #[test]
    fn test_expired_token_rejected() {
        let (gate, codec) = gate();
        let token = codec
            .issue_at("admin", &[], Utc::now() - Duration::days(8))
            .unwrap();
        assert_eq!(
            gate.evaluate(&Method::GET, "/user/list", &bearer(&token)),
            GateOutcome::Rejected(TokenRejection::Expired)
        );
    }

    #[test]
    fn test_foreign_token_rejected() {
        let (gate, _) = gate();
        let mut other = config();
        other.token.secret = "ffffffffffffffffffffffffffffffff".to_string();
        let token = TokenCodec::new(&other.token).issue("admin", &[]).unwrap();

        assert_eq!(
            gate.evaluate(&Method::GET, "/user/list", &bearer(&token)),
            GateOutcome::Rejected(TokenRejection::Invalid(TokenError::InvalidSignature))
        );
    }

    #[test]
    fn test_token_without_authorities_rejected() {
        use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

        let (gate, codec) = gate();
        let now = Utc::now();
        let claims = crate::token::Claims {
            sub: "alice".to_string(),
            iss: "Warden".to_string(),
            aud: "Warden Administration".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(1)).timestamp(),
            authorities: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(codec.verify(&token).is_ok());
        assert_eq!(
            codec.extract_authorities(&token),
            Err(TokenError::MissingAuthorities)
        );
        assert_eq!(
            gate.evaluate(&Method::GET, "/user/list", &bearer(&token)),
            GateOutcome::Rejected(TokenRejection::Invalid(TokenError::MissingAuthorities))
        );
    }

    #[tokio::test]
    async fn test_guard_lets_options_through() {
        use axum::{body::Body, middleware::from_fn_with_state, routing::get, Router};
        use tower::ServiceExt;

        let app = Router::new()
            .route("/user/list", get(|| async { "users" }).options(|| async { "preflight" }))
            .route_layer(from_fn_with_state(
                RequiredAuthority::any(&[USER_READ]),
                require_authority,
            ));

        let options = axum::http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/user/list")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(options).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let get = axum::http::Request::builder()
            .uri("/user/list")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(get).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_custom_header_name() {
        let mut config = config();
        config.token.header = "X-Auth".to_string();
        let codec = TokenCodec::new(&config.token);
        let gate = AuthorizationGate::new(&config, codec.clone()).unwrap();
        let token = codec.issue("alice", &[]).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-auth", HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        assert!(matches!(
            gate.evaluate(&Method::GET, "/user/list", &headers),
            GateOutcome::Authenticated(_)
        ));
        assert_eq!(
            gate.evaluate(&Method::GET, "/user/list", &bearer(&token)),
            GateOutcome::Unauthenticated
        );
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let mut config = config();
        config.token.header = "bad header".to_string();
        let codec = TokenCodec::new(&config.token);
        assert!(AuthorizationGate::new(&config, codec).is_err());
    }
}
