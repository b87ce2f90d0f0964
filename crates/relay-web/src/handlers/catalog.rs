//! Route and backend listings

use axum::{extract::State, response::Json};
use relay_backends::BackendKind;
use serde::Serialize;

use crate::state::SharedContext;

#[derive(Serialize)]
pub struct RouteSummary {
    pub path: String,
    pub methods: &'static [&'static str],
    pub description: String,
    pub backend: String,
    pub mode: &'static str,
    pub inputs: Vec<String>,
}

#[derive(Serialize)]
pub struct RoutesResponse {
    pub routes: Vec<RouteSummary>,
    pub count: usize,
}

/// GET /api/routes - Registered integrations
pub async fn list_routes_handler(State(ctx): State<SharedContext>) -> Json<RoutesResponse> {
    let routes: Vec<RouteSummary> = ctx
        .routes
        .iter()
        .map(|route| RouteSummary {
            path: route.path(),
            methods: route.methods(),
            description: route.description.clone(),
            backend: ctx.backends.resolve_name(&route.backend).to_string(),
            mode: route.mode.name(),
            inputs: route
                .input
                .fields()
                .iter()
                .map(|f| format!("{}: {}{}", f.name, f.kind, if f.required { "" } else { "?" }))
                .collect(),
        })
        .collect();

    Json(RoutesResponse {
        count: routes.len(),
        routes,
    })
}

#[derive(Serialize)]
pub struct BackendSummary {
    pub name: String,
    pub kind: Option<BackendKind>,
}

#[derive(Serialize)]
pub struct BackendsResponse {
    pub default: String,
    pub default_model: String,
    pub backends: Vec<BackendSummary>,
}

/// GET /api/backends - Configured backends and the default
pub async fn list_backends_handler(State(ctx): State<SharedContext>) -> Json<BackendsResponse> {
    let backends = ctx
        .backends
        .names()
        .map(|name| BackendSummary {
            name: name.to_string(),
            kind: ctx.backends.get(name).map(|b| b.kind()),
        })
        .collect();

    Json(BackendsResponse {
        default: ctx.backends.default_name().to_string(),
        default_model: ctx.config.default_model.clone(),
        backends,
    })
}
