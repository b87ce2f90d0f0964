//! Router assembly

use axum::{
    middleware,
    routing::get,
    Router,
};
use relay_http::{RouterBuilder, ServiceRouter};

use crate::handlers;
use crate::middleware::{deadline, security};
use crate::state::SharedContext;

/// Introspection endpoints under `/api`
pub struct ApiRoutes;

impl ServiceRouter for ApiRoutes {
    fn prefix() -> &'static str {
        "/api"
    }

    fn name() -> &'static str {
        "introspection"
    }

    fn description() -> &'static str {
        "health, registered routes and configured backends"
    }
}

/// Create the complete router: `/api/*`, every `/<namespace>/<capability>/invoke`
/// route and the artifact files under `/files`
pub fn create_router(ctx: SharedContext) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route("/routes", get(handlers::catalog::list_routes_handler))
        .route("/backends", get(handlers::catalog::list_backends_handler))
        .with_state(ctx.clone());

    let invoke_routes = Router::new()
        .route(
            "/:namespace/:capability/invoke",
            get(handlers::invoke::invoke_get).post(handlers::invoke::invoke_post),
        )
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            security::require_access_key,
        ))
        .with_state(ctx.clone());

    RouterBuilder::new()
        .mount::<ApiRoutes>(api_routes)
        .merge("integrations", invoke_routes)
        .files("/files", ctx.config.artifact_dir.clone())
        .build()
        .layer(middleware::from_fn_with_state(ctx, deadline::enforce_deadline))
}
