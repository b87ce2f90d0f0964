//! HTTP error responses
//!
//! Every failure leaves the gateway as an error envelope carrying the
//! invocation id, with a status code chosen from the error class.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_core::{DispatchError, Envelope, Error, InvocationId, Redactor};
use tracing::{error, warn};

/// Status code for an error that reaches the client
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(v) if v.is_malformed() => StatusCode::BAD_REQUEST,
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Dispatch(DispatchError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An error envelope ready to be sent
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    envelope: Envelope,
}

impl ApiError {
    /// Log `err` and turn it into a response; secrets are masked in both
    pub fn from_error(invocation_id: InvocationId, err: Error, redactor: &Redactor) -> Self {
        let status = status_for(&err);
        let message = redactor.redact(&err.to_string());

        if status.is_server_error() {
            error!(
                invocation_id = %invocation_id,
                kind = err.kind(),
                "Invocation failed: {}",
                message
            );
        } else {
            warn!(
                invocation_id = %invocation_id,
                kind = err.kind(),
                "Invocation rejected: {}",
                message
            );
        }

        Self::with_status(status, invocation_id, message)
    }

    pub fn with_status(
        status: StatusCode,
        invocation_id: InvocationId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            envelope: Envelope::error(invocation_id, message),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{BackendError, TemplateError, ValidationError};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                Error::from(ValidationError::InvalidJson("eof".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::from(ValidationError::MissingField("q".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (Error::not_found("route"), StatusCode::NOT_FOUND),
            (
                Error::from(DispatchError::Closed),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::from(DispatchError::Panicked("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::from(TemplateError::NotFound("x.j2".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::from(BackendError::Transport("refused".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "{}", err);
        }
    }

    #[test]
    fn test_error_message_is_redacted() {
        let redactor = Redactor::new(["sk-live-123"]);
        let err = Error::from(BackendError::Status {
            code: 401,
            body: "bad key sk-live-123".into(),
        });
        let api = ApiError::from_error(InvocationId::new(), err, &redactor);

        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let message = &api.envelope().response()[0].message;
        assert!(!message.contains("sk-live-123"));
        assert!(message.contains("***"));
    }
}
