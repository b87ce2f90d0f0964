//! Invocation Handler
//!
//! Serves every `/<namespace>/<capability>/invoke` route:
//! validate → resolve inputs → dispatch → render → respond.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_backends::{Completion, CompletionRequest, SharedBackend};
use relay_core::{Envelope, Error, InvocationId, ResponseMessage, ValidationError};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::ApiError;
use crate::handlers::stream;
use crate::registry::{OutputMode, RouteSpec};
use crate::state::{AppContext, SharedContext};

/// POST /:namespace/:capability/invoke
pub async fn invoke_post(
    State(ctx): State<SharedContext>,
    Path((namespace, capability)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let invocation_id = InvocationId::new();
    let route = lookup(&ctx, invocation_id, &namespace, &capability)?;

    let body: Value = serde_json::from_slice(&body).map_err(|e| {
        ApiError::from_error(
            invocation_id,
            ValidationError::InvalidJson(e.to_string()).into(),
            &ctx.redactor,
        )
    })?;

    invoke(ctx, route, invocation_id, body).await
}

/// GET /:namespace/:capability/invoke, for routes that allow it.
/// Query parameters are typed by the route's input schema.
pub async fn invoke_get(
    State(ctx): State<SharedContext>,
    Path((namespace, capability)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let invocation_id = InvocationId::new();
    let route = lookup(&ctx, invocation_id, &namespace, &capability)?;

    if !route.allow_get {
        return Err(ApiError::with_status(
            StatusCode::METHOD_NOT_ALLOWED,
            invocation_id,
            format!("{} only accepts POST", route.path()),
        ));
    }

    let body = route.input.coerce_query(&params);
    invoke(ctx, route, invocation_id, body).await
}

fn lookup(
    ctx: &AppContext,
    invocation_id: InvocationId,
    namespace: &str,
    capability: &str,
) -> Result<Arc<RouteSpec>, ApiError> {
    ctx.routes.get(namespace, capability).ok_or_else(|| {
        ApiError::from_error(
            invocation_id,
            Error::not_found(format!("no route /{}/{}/invoke", namespace, capability)),
            &ctx.redactor,
        )
    })
}

async fn invoke(
    ctx: SharedContext,
    route: Arc<RouteSpec>,
    invocation_id: InvocationId,
    body: Value,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let fail = |err: Error| ApiError::from_error(invocation_id, err, &ctx.redactor);

    debug!(
        invocation_id = %invocation_id,
        route = %route.path(),
        mode = route.mode.name(),
        "Invocation started"
    );

    let input = route.input.validate(&body).map_err(|e| fail(e.into()))?;
    let backend = ctx.backends.get(&route.backend).ok_or_else(|| {
        fail(Error::config(format!(
            "backend '{}' is not configured",
            route.backend
        )))
    })?;
    let request = match prepare(&ctx, &route, &backend, &input).await {
        Ok(request) => request,
        Err(err) => return recover(&ctx, &route, invocation_id, err),
    };

    let interval = match route.mode {
        OutputMode::Stream { interval_ms } => Some(Duration::from_millis(interval_ms)),
        _ => None,
    };
    if let Some(interval) = interval {
        let body = stream::start(
            ctx.clone(),
            route.clone(),
            invocation_id,
            input,
            backend,
            request,
            interval,
        );
        return Ok(body.into_response());
    }

    let completion = match complete(&ctx, backend, request).await {
        Ok(completion) => completion,
        Err(err) => return recover(&ctx, &route, invocation_id, err),
    };

    let rendered = ctx
        .templates
        .render(
            &route.response_template,
            json!({
                "output": &completion.text,
                "model": &completion.model,
                "input": &input,
            }),
        )
        .map_err(|e| fail(e.into()))?;

    let message = match route.mode {
        OutputMode::Artifact { ref extension } => {
            let file_name = format!("{}.{}", invocation_id, extension);
            write_artifact(&ctx, &file_name, rendered)
                .await
                .map_err(fail)?;
            ResponseMessage::url(ctx.config.artifact_url(&file_name))
        }
        _ => ResponseMessage::new(rendered, route.message_type),
    };

    info!(
        invocation_id = %invocation_id,
        route = %route.path(),
        model = %completion.model,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Invocation completed"
    );
    Ok(Json(Envelope::success(invocation_id, message)).into_response())
}

/// Render the prompt (and optional system prompt) for `route`.
/// With `include_models`, the backend's model list is fetched first.
async fn prepare(
    ctx: &AppContext,
    route: &RouteSpec,
    backend: &SharedBackend,
    input: &Map<String, Value>,
) -> Result<CompletionRequest, Error> {
    let mut vars = input.clone();

    if route.include_models {
        let backend = backend.clone();
        let models = ctx
            .dispatcher
            .run(move || backend.list_models().map_err(Error::from))
            .await?;
        vars.insert("models".to_string(), serde_json::to_value(models)?);
    }

    let prompt = ctx.templates.render(&route.prompt_template, &vars)?;
    let model = route
        .model
        .clone()
        .unwrap_or_else(|| ctx.config.default_model.clone());
    let mut request = CompletionRequest::new(model, prompt);
    if let Some(temperature) = route.temperature {
        request = request.with_temperature(temperature);
    }
    if let Some(max_tokens) = route.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }

    if let Some(ref name) = route.system_template {
        let system = ctx.templates.render(name, &vars)?;
        if !system.trim().is_empty() {
            request = request.with_system(system);
        }
    }
    Ok(request)
}

async fn complete(
    ctx: &AppContext,
    backend: SharedBackend,
    request: CompletionRequest,
) -> Result<Completion, Error> {
    ctx.dispatcher
        .run(move || backend.complete(&request).map_err(Error::from))
        .await
}

/// Backend failures on routes with a fallback message become a 200 error
/// envelope (or, for streams, an error event and the final event); the real
/// cause is only logged
fn recover(
    ctx: &AppContext,
    route: &RouteSpec,
    invocation_id: InvocationId,
    err: Error,
) -> Result<Response, ApiError> {
    match (&err, &route.fallback_message) {
        (Error::Backend(cause), Some(fallback)) => {
            error!(
                invocation_id = %invocation_id,
                route = %route.path(),
                backend = %route.backend,
                "Backend call failed, answering with fallback: {}",
                ctx.redactor.redact(&cause.to_string())
            );
            let response = match route.mode {
                OutputMode::Stream { .. } => {
                    stream::failed(invocation_id, fallback.clone()).into_response()
                }
                _ => Json(Envelope::error(invocation_id, fallback.clone())).into_response(),
            };
            Ok(response)
        }
        _ => Err(ApiError::from_error(invocation_id, err, &ctx.redactor)),
    }
}

/// Write rendered output under the artifact directory on the blocking pool
async fn write_artifact(ctx: &AppContext, file_name: &str, content: String) -> Result<(), Error> {
    let dir = ctx.config.artifact_dir.clone();
    let path = dir.join(file_name);

    ctx.dispatcher
        .run(move || {
            fs::create_dir_all(&dir)?;
            fs::write(&path, content)?;
            debug!("Artifact written: {}", path.display());
            Ok::<_, Error>(())
        })
        .await
}
