//! Health Check Handler

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::state::SharedContext;

#[derive(Serialize)]
pub struct DispatcherStatus {
    pub capacity: usize,
    pub in_flight: usize,
    pub available: usize,
    pub closed: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub started_at: String,
    pub uptime_secs: u64,
    pub dispatcher: DispatcherStatus,
}

/// GET /api/health - Health check endpoint
pub async fn health_handler(State(ctx): State<SharedContext>) -> Json<HealthResponse> {
    let dispatcher = &ctx.dispatcher;
    let status = if dispatcher.is_closed() {
        "shutting_down"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: ctx.started_at.to_rfc3339(),
        uptime_secs: ctx.uptime_secs(),
        dispatcher: DispatcherStatus {
            capacity: dispatcher.capacity(),
            in_flight: dispatcher.in_flight(),
            available: dispatcher.available(),
            closed: dispatcher.is_closed(),
        },
    })
}
