//! Backend Trait and Types
//!
//! A backend is a synchronous client for one external service. The trait is
//! deliberately blocking: the gateway pushes every call through its bounded
//! dispatcher instead of awaiting network I/O on the request task.

use relay_core::BackendError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Echo,
    Ollama,
    OpenAi,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Echo => write!(f, "echo"),
            BackendKind::Ollama => write!(f, "ollama"),
            BackendKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "echo" => Ok(BackendKind::Echo),
            "ollama" => Ok(BackendKind::Ollama),
            "openai" | "open_ai" | "azure" | "azure_openai" => Ok(BackendKind::OpenAi),
            other => Err(format!("Unknown backend type: {}", other)),
        }
    }
}

/// One prompt for a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}

/// Token usage information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw backend output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Model information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl ModelInfo {
    pub fn named(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
        }
    }
}

/// Shared handle used by the registry and the dispatcher closures
pub type SharedBackend = Arc<dyn Backend>;

/// Blocking backend client
pub trait Backend: Send + Sync {
    /// Backend type
    fn kind(&self) -> BackendKind;

    /// Models (or assistants/deployments) the backend offers
    fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError>;

    /// Run one prompt to completion
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError>;

    /// Run one prompt, handing each produced chunk to `sink` as it arrives.
    ///
    /// `sink` returns `false` once the consumer is gone; implementations stop
    /// reading at that point. The default completes first and then yields the
    /// output line by line.
    fn stream(
        &self,
        request: &CompletionRequest,
        sink: &mut dyn FnMut(String) -> bool,
    ) -> Result<(), BackendError> {
        let completion = self.complete(request)?;
        for line in completion.text.lines() {
            if !sink(line.to_string()) {
                break;
            }
        }
        Ok(())
    }
}

/// Translate a reqwest failure into the gateway's backend error
pub(crate) fn map_http_error(err: reqwest::Error, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(timeout)
    } else if err.is_decode() {
        BackendError::Malformed(err.to_string())
    } else {
        BackendError::Transport(err.without_url().to_string())
    }
}

/// Turn a non-2xx response into `BackendError::Status`
pub(crate) fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(BackendError::Status {
        code: status.as_u16(),
        body: truncate(&body, 512),
    })
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
