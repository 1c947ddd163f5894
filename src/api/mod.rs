//! HTTP surface
//!
//! Every route lives under `/user`. The authorization middleware wraps the
//! whole router; routes that need an authority carry a `require_authority`
//! route layer, and self-service routes take an [`AuthPrincipal`] argument.
//!
//! | Route | Access |
//! |---|---|
//! | `POST /user/login`, `POST /user/register` | public |
//! | `GET /user/image/{username}/{file}` | public |
//! | `POST /user/add` | `user:create` |
//! | `POST /user/update` | `user:update` |
//! | `GET /user/find/{username}`, `GET /user/list` | `user:read` |
//! | `DELETE /user/delete/{username}` | `user:delete` |
//! | `GET /user/reset-password/{email}` | authenticated |
//! | `POST /user/update-profile-image` | authenticated |
//! | `POST /user/preference/update` | authenticated |
//!
//! [`AuthPrincipal`]: crate::auth::AuthPrincipal

pub mod users;

use std::sync::Arc;

use axum::{
    http::HeaderName,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};

use crate::auth::{authorization_middleware, require_authority, AuthorizationGate, RequiredAuthority};
use crate::config::{ConfigError, WardenConfig};
use crate::mail::Mailer;
use crate::role::{USER_CREATE, USER_DELETE, USER_READ, USER_UPDATE};
use crate::service::AccountService;
use crate::store::UserStore;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub gate: Arc<AuthorizationGate>,
    pub config: Arc<WardenConfig>,
    /// Header carrying a freshly issued token on login
    pub token_response_header: HeaderName,
}

impl AppState {
    pub fn new(
        config: WardenConfig,
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, ConfigError> {
        let accounts = AccountService::new(&config, store, mailer);
        let gate = AuthorizationGate::new(&config, accounts.tokens().clone())?;
        let token_response_header = HeaderName::from_bytes(config.token.response_header.as_bytes())
            .map_err(|e| ConfigError::OutOfRange {
                field: "token.response_header",
                message: e.to_string(),
            })?;

        Ok(Self {
            accounts: Arc::new(accounts),
            gate: Arc::new(gate),
            config: Arc::new(config),
            token_response_header,
        })
    }
}

fn guarded(router: Router<AppState>, authorities: &'static [&'static str]) -> Router<AppState> {
    router.route_layer(from_fn_with_state(
        RequiredAuthority::any(authorities),
        require_authority,
    ))
}

/// Build the `/user` router with authorization applied.
pub fn router(state: AppState) -> Router {
    let open = Router::new()
        .route("/user/login", post(users::login))
        .route("/user/register", post(users::register))
        .route("/user/image/{username}/{file}", get(users::profile_image))
        .route("/user/reset-password/{email}", get(users::reset_password))
        .route("/user/update-profile-image", post(users::update_profile_image))
        .route("/user/preference/update", post(users::update_preference));

    let read = guarded(
        Router::new()
            .route("/user/find/{username}", get(users::find_user))
            .route("/user/list", get(users::list_users)),
        &[USER_READ],
    );
    let create = guarded(Router::new().route("/user/add", post(users::add_user)), &[USER_CREATE]);
    let update = guarded(
        Router::new().route("/user/update", post(users::update_user)),
        &[USER_UPDATE],
    );
    let remove = guarded(
        Router::new().route("/user/delete/{username}", delete(users::delete_user)),
        &[USER_DELETE],
    );

    let gate = state.gate.clone();
    Router::new()
        .merge(open)
        .merge(read)
        .merge(create)
        .merge(update)
        .merge(remove)
        .with_state(state)
        .layer(from_fn_with_state(gate, authorization_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::error::{ACCESS_DENIED_MESSAGE, FORBIDDEN_MESSAGE};
    use crate::login::MAX_ATTEMPTS;
    use crate::mail::MemoryMailer;
    use crate::model::NewUser;
    use crate::password::hash_password;
    use crate::role::Role;
    use crate::store::MemoryUserStore;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const BOUNDARY: &str = "warden-test-boundary";

    struct TestApp {
        app: Router,
        state: AppState,
        store: Arc<MemoryUserStore>,
        mailer: Arc<MemoryMailer>,
        _dir: tempfile::TempDir,
    }

    fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let config = WardenConfig::builder()
            .jwt_secret(SECRET)
            .image_root(dir.path())
            .build()
            .unwrap();
        let store = Arc::new(MemoryUserStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let state = AppState::new(config, store.clone(), mailer.clone()).unwrap();
        TestApp {
            app: router(state.clone()),
            state,
            store,
            mailer,
            _dir: dir,
        }
    }

    impl TestApp {
        async fn seed(&self, username: &str, role: Role) {
            let password_hash = hash_password("password1").unwrap();
            self.store
                .insert(NewUser {
                    user_id: "0000000001".to_string(),
                    first_name: "Seed".to_string(),
                    last_name: "User".to_string(),
                    username: username.to_string(),
                    email: format!("{username}@x.com"),
                    password_hash,
                    profile_image_url: String::new(),
                    join_date: chrono::Utc::now(),
                    role,
                    active: true,
                    not_locked: true,
                })
                .await
                .unwrap();
        }

        fn token_for(&self, username: &str, role: Role) -> String {
            self.state
                .accounts
                .tokens()
                .issue(username, &role.authority_list())
                .unwrap()
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.app.clone().oneshot(request).await.unwrap()
        }
    }

    fn get_with(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn json_post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_post(uri: &str, token: &str, fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((content_type, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"profileImage\"; filename=\"me.png\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_login_returns_token_header() {
        let t = test_app();
        let response = t
            .send(json_post(
                "/user/register",
                serde_json::json!({
                    "firstName": "Alice",
                    "lastName": "Smith",
                    "userName": "alice",
                    "email": "alice@x.com"
                }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let user = body_json(response).await;
        assert_eq!(user["role"], "ROLE_USER");
        assert_eq!(user["authorities"], serde_json::json!(["analysis"]));
        assert!(user.get("passwordHash").is_none());

        let password = t.mailer.last_password_for("alice@x.com").unwrap();
        let response = t
            .send(json_post(
                "/user/login",
                serde_json::json!({"userName": "alice", "password": password}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = response.headers()["jwt-token"].to_str().unwrap().to_string();
        assert_eq!(
            t.state.accounts.tokens().extract_subject(&token).unwrap(),
            "alice"
        );
    }

    #[tokio::test]
    async fn test_register_duplicate_is_conflict() {
        let t = test_app();
        t.seed("alice", Role::User).await;
        let response = t
            .send(json_post(
                "/user/register",
                serde_json::json!({
                    "firstName": "A",
                    "lastName": "B",
                    "userName": "alice",
                    "email": "new@x.com"
                }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["message"], "Username already exists");
    }

    #[tokio::test]
    async fn test_login_lockout_over_http() {
        let t = test_app();
        t.seed("alice", Role::User).await;

        for _ in 0..MAX_ATTEMPTS {
            let response = t
                .send(json_post(
                    "/user/login",
                    serde_json::json!({"userName": "alice", "password": "nope"}),
                ))
                .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let response = t
            .send(json_post(
                "/user/login",
                serde_json::json!({"userName": "alice", "password": "password1"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await["message"],
            "Your account has been locked. Please contact administration"
        );
    }

    #[tokio::test]
    async fn test_protected_route_without_token_is_unauthorized() {
        let t = test_app();
        let response = t.send(get_with("/user/list", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], FORBIDDEN_MESSAGE);
    }

    #[tokio::test]
    async fn test_bad_token_is_unauthorized() {
        let t = test_app();
        let response = t.send(get_with("/user/list", Some("not.a.token"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_authority_is_forbidden() {
        let t = test_app();
        t.seed("alice", Role::User).await;
        let token = t.token_for("alice", Role::User);

        let response = t.send(get_with("/user/list", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["message"], ACCESS_DENIED_MESSAGE);
    }

    #[tokio::test]
    async fn test_read_authority_lists_and_finds() {
        let t = test_app();
        t.seed("alice", Role::User).await;
        t.seed("helper", Role::Assistant).await;
        let token = t.token_for("helper", Role::Assistant);

        let response = t.send(get_with("/user/list", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);

        let response = t.send(get_with("/user/find/alice", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["userName"], "alice");

        let response = t.send(get_with("/user/find/nobody", Some(&token))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_requires_delete_authority() {
        let t = test_app();
        t.seed("alice", Role::User).await;

        let admin = t.token_for("admin", Role::Admin);
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/user/delete/alice")
            .header(header::AUTHORIZATION, format!("Bearer {admin}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(t.send(request).await.status(), StatusCode::FORBIDDEN);

        let root = t.token_for("root", Role::SuperAdmin);
        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/user/delete/alice")
            .header(header::AUTHORIZATION, format!("Bearer {root}"))
            .body(Body::empty())
            .unwrap();
        let response = t.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "User deleted successfully.");
        assert!(t.store.is_empty());
    }

    #[tokio::test]
    async fn test_add_user_via_multipart() {
        let t = test_app();
        let token = t.token_for("admin", Role::Admin);
        let request = multipart_post(
            "/user/add",
            &token,
            &[
                ("firstName", "Bob"),
                ("lastName", "Jones"),
                ("userName", "bob"),
                ("email", "bob@x.com"),
                ("role", "ROLE_ASSISTANT"),
                ("isActive", "true"),
                ("isNotLocked", "true"),
            ],
            Some(("image/png", b"png-bytes")),
        );

        let response = t.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let user = body_json(response).await;
        assert_eq!(user["role"], "ROLE_ASSISTANT");
        assert!(user["profileImageUrl"]
            .as_str()
            .unwrap()
            .ends_with("/user/image/bob/bob.jpg"));

        let response = t.send(get_with("/user/image/bob/bob.jpg", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"png-bytes");
    }

    #[tokio::test]
    async fn test_add_user_rejects_unknown_role_and_non_image() {
        let t = test_app();
        let token = t.token_for("admin", Role::Admin);
        let mut fields = vec![
            ("firstName", "Bob"),
            ("lastName", "Jones"),
            ("userName", "bob"),
            ("email", "bob@x.com"),
            ("role", "ROLE_EMPEROR"),
            ("isActive", "true"),
            ("isNotLocked", "true"),
        ];
        let response = t.send(multipart_post("/user/add", &token, &fields, None)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        fields[4] = ("role", "ROLE_USER");
        let response = t
            .send(multipart_post(
                "/user/add",
                &token,
                &fields,
                Some(("text/plain", b"hello")),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "me.png is not an image file. Please upload an image"
        );
    }

    #[tokio::test]
    async fn test_update_user_needs_update_authority() {
        let t = test_app();
        t.seed("alice", Role::User).await;
        let fields = [
            ("currentUserName", "alice"),
            ("firstName", "Alicia"),
            ("lastName", "Smith"),
            ("userName", "alice"),
            ("email", "alice@x.com"),
            ("role", "ROLE_ADMIN"),
            ("isActive", "true"),
            ("isNotLocked", "true"),
        ];

        let user_token = t.token_for("alice", Role::User);
        let response = t
            .send(multipart_post("/user/update", &user_token, &fields, None))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let assistant = t.token_for("helper", Role::Assistant);
        let response = t
            .send(multipart_post("/user/update", &assistant, &fields, None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let user = body_json(response).await;
        assert_eq!(user["firstName"], "Alicia");
        assert_eq!(user["role"], "ROLE_ADMIN");
    }

    #[tokio::test]
    async fn test_reset_password_requires_authentication() {
        let t = test_app();
        t.seed("alice", Role::User).await;

        let response = t.send(get_with("/user/reset-password/alice@x.com", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let token = t.token_for("alice", Role::User);
        let response = t
            .send(get_with("/user/reset-password/alice@x.com", Some(&token)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["message"],
            "An email with a new password was sent to: alice@x.com"
        );
        assert_eq!(body["httpStatusCode"], 200);
        assert!(t.mailer.last_password_for("alice@x.com").is_some());
    }

    #[tokio::test]
    async fn test_update_preference_form() {
        let t = test_app();
        t.seed("alice", Role::User).await;
        let token = t.token_for("alice", Role::User);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/user/preference/update")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("userName=alice&keyword=rust&language=en&callTime=15"))
            .unwrap();
        let response = t.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let user = body_json(response).await;
        assert_eq!(user["preference"]["keyword"], "rust");
        assert_eq!(user["preference"]["callTime"], 15);
    }

    #[tokio::test]
    async fn test_update_profile_image() {
        let t = test_app();
        t.seed("alice", Role::User).await;
        let token = t.token_for("alice", Role::User);

        let response = t
            .send(multipart_post(
                "/user/update-profile-image",
                &token,
                &[("userName", "alice")],
                Some(("image/jpeg", b"jpeg")),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["profileImageUrl"]
            .as_str()
            .unwrap()
            .ends_with("/user/image/alice/alice.jpg"));

        let response = t
            .send(multipart_post(
                "/user/update-profile-image",
                &token,
                &[("userName", "alice")],
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_missing_image_is_not_found() {
        let t = test_app();
        let response = t.send(get_with("/user/image/ghost/ghost.jpg", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preflight_passes_gate() {
        let t = test_app();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/user/list")
            .body(Body::empty())
            .unwrap();
        let response = t.send(request).await;
        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
