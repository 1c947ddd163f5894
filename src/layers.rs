//! Hardening layers for Axum routers
//!
//! Provides the `SecureRouter` trait that wraps a router with timeout, body
//! limit, security header, CORS and tracing layers.

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::WardenConfig;

/// Extension trait for applying hardening layers to an Axum Router.
///
/// # Example
///
/// ```ignore
/// use warden::{SecureRouter, WardenConfig};
///
/// let config = WardenConfig::from_env()?;
/// let app = warden::api::router(state).with_security(&config);
/// ```
pub trait SecureRouter {
    /// Apply all layers based on the provided configuration.
    ///
    /// From outermost to innermost:
    /// 1. TraceLayer
    /// 2. CorsLayer (handles preflight)
    /// 3. Security headers
    /// 4. Request body limit
    /// 5. Timeout
    fn with_security(self, config: &WardenConfig) -> Self;
}

impl<S> SecureRouter for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_security(self, config: &WardenConfig) -> Self {
        let http = &config.http;
        let mut router = self;

        router = router.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            http.request_timeout,
        ));

        // Replaces axum's built-in 2MB extractor limit
        router = router
            .layer(RequestBodyLimitLayer::new(http.max_request_size))
            .layer(DefaultBodyLimit::disable());

        if http.security_headers_enabled {
            router = router
                .layer(SetResponseHeaderLayer::overriding(
                    header::STRICT_TRANSPORT_SECURITY,
                    HeaderValue::from_static("max-age=31536000; includeSubDomains"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static(
                        "default-src 'none'; img-src 'self'; frame-ancestors 'none'",
                    ),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_XSS_PROTECTION,
                    HeaderValue::from_static("0"),
                ));
        }

        router = router.layer(build_cors_layer(config));

        if http.tracing_enabled {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }
}

/// Build CORS layer based on configuration.
///
/// The token request header is allowed and the response header exposed, so
/// browser clients can send and read tokens.
fn build_cors_layer(config: &WardenConfig) -> CorsLayer {
    let http = &config.http;
    let token_header = HeaderName::from_bytes(config.token.header.as_bytes()).ok();
    let response_header = HeaderName::from_bytes(config.token.response_header.as_bytes()).ok();

    let mut allowed = vec![header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT];
    allowed.extend(token_header);

    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(allowed)
        .expose_headers(response_header.into_iter().collect::<Vec<_>>())
        .max_age(Duration::from_secs(3600));

    if http.cors_is_restrictive() {
        base
    } else if http.cors_is_permissive() {
        base.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = http
            .cors_origins
            .iter()
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();
        base.allow_origin(origins).allow_credentials(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    fn config(http: crate::config::HttpConfig) -> WardenConfig {
        WardenConfig::builder()
            .jwt_secret("0123456789abcdef0123456789abcdef")
            .http(http)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_security_headers_applied() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .with_security(&config(Default::default()));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mut http = crate::config::HttpConfig::default();
        http.max_request_size = 8;
        let app = Router::new()
            .route("/", axum::routing::post(|body: String| async move { body }))
            .with_security(&config(http));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .body(Body::from("0123456789abcdef"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_cors_exposes_token_header() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .with_security(&config(crate::config::HttpConfig::development()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::ORIGIN, "http://localhost:4200")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let exposed = response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(exposed.contains("jwt-token"));
    }
}
