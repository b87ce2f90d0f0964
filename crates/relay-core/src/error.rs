//! Error types for the relay gateway

use std::time::Duration;
use thiserror::Error;

use crate::dispatcher::DispatchError;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Short machine-friendly name of the error class, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Backend(BackendError::Timeout(_)) => "timeout",
            Error::Backend(_) => "backend",
            Error::Template(_) => "template",
            Error::Dispatch(_) => "dispatch",
            Error::Config(_) => "config",
            Error::NotFound(_) => "not_found",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Request body failed to parse or did not match the route schema
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{field}' must be of type {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("field '{field}' exceeds maximum length of {max}")]
    TooLong { field: String, max: usize },
}

impl ValidationError {
    /// Unparsable bodies are reported as 400; everything else is a schema failure
    pub fn is_malformed(&self) -> bool {
        matches!(self, ValidationError::InvalidJson(_))
    }
}

/// An external backend call failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("backend returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed backend response: {0}")]
    Malformed(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Named template is missing or failed to render
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("template '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },

    #[error("failed to render template '{name}': {reason}")]
    Render { name: String, reason: String },
}

/// Masks configured secret values before error text leaves the process
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

/// Secrets shorter than this are not masked; replacing them would mangle ordinary text
const MIN_SECRET_LEN: usize = 4;

impl Redactor {
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| s.len() >= MIN_SECRET_LEN)
            .collect();
        // Longest first so a secret containing another is masked whole
        secrets.sort_by(|a, b| b.len().cmp(&a.len()));
        secrets.dedup();
        Self { secrets }
    }

    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redactor_masks_secrets() {
        let redactor = Redactor::new(["sk-live-123456", "abc"]);
        let text = "401 for key sk-live-123456 (abc)";
        assert_eq!(redactor.redact(text), "401 for key *** (abc)");
    }

    #[test]
    fn test_redactor_prefers_longest_secret() {
        let redactor = Redactor::new(["token", "token-extended"]);
        assert_eq!(redactor.redact("token-extended"), "***");
    }

    #[test]
    fn test_error_kind() {
        let err: Error = BackendError::Timeout(Duration::from_secs(30)).into();
        assert_eq!(err.kind(), "timeout");
        let err: Error = TemplateError::NotFound("x".into()).into();
        assert_eq!(err.kind(), "template");
    }

    #[test]
    fn test_validation_malformed() {
        assert!(ValidationError::InvalidJson("eof".into()).is_malformed());
        assert!(!ValidationError::MissingField("query".into()).is_malformed());
    }
}
