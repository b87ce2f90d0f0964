//! Response deadline
//!
//! A request that has not produced response headers within
//! [`AppContext::response_deadline`](crate::state::AppContext::response_deadline)
//! gets a 504 error envelope. Streams are only bounded until their headers
//! are sent.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use relay_core::InvocationId;
use tracing::warn;

use crate::error::ApiError;
use crate::state::SharedContext;

pub async fn enforce_deadline(
    State(ctx): State<SharedContext>,
    request: Request,
    next: Next,
) -> Response {
    let deadline = ctx.response_deadline();
    let path = request.uri().path().to_string();

    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            let invocation_id = InvocationId::new();
            warn!(
                invocation_id = %invocation_id,
                %path,
                deadline_ms = deadline.as_millis() as u64,
                "Request timed out"
            );
            ApiError::with_status(
                StatusCode::GATEWAY_TIMEOUT,
                invocation_id,
                format!("no response within {:?}", deadline),
            )
            .into_response()
        }
    }
}
