//! Shared Middleware Stack
//!
//! One set of layers wrapped around the whole router: CORS, request spans,
//! compression (never for NDJSON), a header timeout, request logging and
//! security headers.

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::time::{Duration, Instant};
use tower_http::{
    compression::{
        predicate::{DefaultPredicate, NotForContentType, Predicate},
        CompressionLayer,
    },
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};

use crate::ndjson::NDJSON_CONTENT_TYPE;

/// Middleware configuration
#[derive(Debug, Clone)]
pub struct MiddlewareConfig {
    /// Enable CORS (default: true)
    pub cors_enabled: bool,
    /// CORS allowed origins (None = any)
    pub cors_origins: Option<Vec<String>>,
    /// Enable request tracing spans (default: true)
    pub tracing_enabled: bool,
    /// Enable response compression (default: true, never for NDJSON streams)
    pub compression_enabled: bool,
    /// Time allowed to produce response headers (default: 120s); expired
    /// requests get an empty 408. `None` leaves deadlines to the router.
    /// Streaming bodies are not cut off by this.
    pub timeout: Option<Duration>,
    /// Enable security headers (default: true)
    pub security_headers: bool,
    /// Enable request logging (default: true)
    pub request_logging: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            cors_enabled: true,
            cors_origins: None,
            tracing_enabled: true,
            compression_enabled: true,
            timeout: Some(Duration::from_secs(120)),
            security_headers: true,
            request_logging: true,
        }
    }
}

impl MiddlewareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict CORS to these origins instead of allowing any
    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_enabled = true;
        self.cors_origins = Some(origins);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn security_headers(mut self, enabled: bool) -> Self {
        self.security_headers = enabled;
        self
    }

    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }
}

/// Middleware stack that can be applied to a router
pub struct MiddlewareStack {
    config: MiddlewareConfig,
}

impl MiddlewareStack {
    pub fn new(config: MiddlewareConfig) -> Self {
        Self { config }
    }

    pub fn default_stack() -> Self {
        Self::new(MiddlewareConfig::default())
    }

    /// Apply the middleware stack to a router. Layers added later wrap the
    /// earlier ones, so CORS sees a request first and security headers are
    /// the last thing written on the way out.
    pub fn apply(self, router: Router) -> Router {
        let config = self.config;
        let mut router = router;

        if config.security_headers {
            router = router.layer(middleware::from_fn(security_headers_middleware));
        }
        if config.request_logging {
            router = router.layer(middleware::from_fn(request_logging_middleware));
        }

        if let Some(timeout) = config.timeout {
            router = router.layer(TimeoutLayer::new(timeout));
        }

        if config.compression_enabled {
            // Compressed NDJSON would sit in the encoder instead of reaching the client
            let predicate =
                DefaultPredicate::new().and(NotForContentType::const_new(NDJSON_CONTENT_TYPE));
            router = router.layer(CompressionLayer::new().compress_when(predicate));
        }

        if config.tracing_enabled {
            router = router.layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            );
        }

        if config.cors_enabled {
            router = router.layer(cors_layer(config.cors_origins.as_deref()));
        }

        router
    }
}

fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origins {
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin: {}", origin);
                        None
                    }
                })
                .collect();
            layer.allow_origin(allowed)
        }
        None => layer.allow_origin(Any),
    }
}

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
];

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(*name, HeaderValue::from_static(*value));
    }
    response
}

async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as u64;

    // Headers only: streamed bodies keep flowing after this point
    match response.status() {
        s if s.is_server_error() => error!(%method, %path, status, latency_ms, "request failed"),
        s if s.is_client_error() => warn!(%method, %path, status, latency_ms, "request rejected"),
        _ => info!(%method, %path, status, latency_ms, "request served"),
    }

    response
}

/// Convenience function to apply middleware with config
pub fn apply_middleware(router: Router, config: MiddlewareConfig) -> Router {
    MiddlewareStack::new(config).apply(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_security_headers_applied() {
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let router = MiddlewareStack::default_stack().apply(router);

        let response = router
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn test_timeout_is_optional() {
        let slow = || {
            Router::new().route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    "done"
                }),
            )
        };
        let request = || Request::builder().uri("/slow").body(Body::empty()).unwrap();

        let config = MiddlewareConfig::new().timeout(Duration::from_millis(20));
        let response = apply_middleware(slow(), config)
            .oneshot(request())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let router = apply_middleware(slow(), MiddlewareConfig::new().without_timeout());
        let response = router.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_headers_can_be_disabled() {
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let router = apply_middleware(router, MiddlewareConfig::new().security_headers(false));

        let response = router
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().get("x-frame-options").is_none());
    }
}
