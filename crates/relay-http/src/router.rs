//! Router Composition
//!
//! Integrations and introspection endpoints each build their own router; the
//! builder mounts them under one root and optionally serves a directory of
//! generated files.

use axum::Router;
use std::path::PathBuf;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Implemented by groups of routes mounted under a fixed prefix
///
/// ```ignore
/// pub struct ApiRoutes;
///
/// impl ServiceRouter for ApiRoutes {
///     fn prefix() -> &'static str {
///         "/api"
///     }
///
///     fn name() -> &'static str {
///         "introspection"
///     }
/// }
///
/// let router = RouterBuilder::new().mount::<ApiRoutes>(api_router).build();
/// ```
pub trait ServiceRouter: Send + Sync {
    /// The URL prefix for this group (e.g., "/api")
    fn prefix() -> &'static str;

    /// Name for logging
    fn name() -> &'static str;

    fn description() -> &'static str {
        ""
    }
}

/// Builder for composing routers
pub struct RouterBuilder {
    router: Router,
    files: Option<(&'static str, PathBuf)>,
    services: Vec<(&'static str, &'static str)>, // (prefix, name)
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            files: None,
            services: Vec::new(),
        }
    }

    /// Add a router at a specific prefix
    pub fn nest(mut self, prefix: &'static str, name: &'static str, router: Router) -> Self {
        info!("Mounting service '{}' at {}", name, prefix);
        self.router = self.router.nest(prefix, router);
        self.services.push((prefix, name));
        self
    }

    /// Add a router at the prefix declared by its `ServiceRouter` impl
    pub fn mount<S: ServiceRouter>(self, router: Router) -> Self {
        self.nest(S::prefix(), S::name(), router)
    }

    /// Merge another router (no prefix)
    pub fn merge(mut self, name: &'static str, router: Router) -> Self {
        info!("Merging service '{}' at /", name);
        self.router = self.router.merge(router);
        self.services.push(("/", name));
        self
    }

    /// Serve files from `path` under `prefix` (e.g. "/files")
    pub fn files(mut self, prefix: &'static str, path: impl Into<PathBuf>) -> Self {
        self.files = Some((prefix, path.into()));
        self
    }

    /// Mounted services as (prefix, name)
    pub fn services(&self) -> &[(&'static str, &'static str)] {
        &self.services
    }

    /// Build the final router
    pub fn build(mut self) -> Router {
        if let Some((prefix, dir)) = self.files {
            if !dir.exists() {
                warn!("File directory not found yet: {:?}", dir);
            }
            info!("Serving files from {:?} at {}", dir, prefix);
            self.router = self.router.nest_service(prefix, ServeDir::new(dir));
        }

        self.router
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode, routing::get};
    use tower::ServiceExt;

    struct Ping;

    impl ServiceRouter for Ping {
        fn prefix() -> &'static str {
            "/ping"
        }

        fn name() -> &'static str {
            "ping"
        }
    }

    #[tokio::test]
    async fn test_mount_uses_declared_prefix() {
        let builder =
            RouterBuilder::new().mount::<Ping>(Router::new().route("/", get(|| async { "pong" })));
        assert_eq!(builder.services(), &[("/ping", "ping")]);

        let response = builder
            .build()
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_files_are_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let router = RouterBuilder::new().files("/files", dir.path()).build();
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/files/a.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"hello");
    }
}
