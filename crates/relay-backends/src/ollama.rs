//! Ollama API Client (Cloud and Local)
//!
//! ## API Endpoints
//!
//! | Endpoint | URL | Purpose |
//! |----------|-----|--------|
//! | Local API | `http://localhost:11434` | Local Ollama instance |
//! | Generate | `/api/generate` | Text generation (NDJSON when streaming) |
//! | Models | `/api/tags` | List local models |
//!
//! ## Authentication
//! - Header: `Authorization: Bearer {OLLAMA_API_KEY}` (cloud only)

use relay_core::config::OllamaSettings;
use relay_core::BackendError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::{
    check_status, map_http_error, Backend, BackendKind, Completion, CompletionRequest, ModelInfo,
    TokenUsage,
};

/// Ollama API endpoints
pub mod endpoints {
    /// Full URL: {API}/api/generate
    pub const GENERATE: &str = "/api/generate";

    /// Full URL: {API}/api/tags
    pub const TAGS: &str = "/api/tags";
}

#[derive(Debug, Deserialize)]
struct OllamaModelsResponse {
    models: Option<Vec<OllamaModel>>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    details: Option<OllamaModelDetails>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelDetails {
    family: Option<String>,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Non-streaming body, and also the shape of every NDJSON line when streaming
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
    model: Option<String>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

/// Ollama Client (Cloud or Local)
pub struct OllamaClient {
    client: Client,
    api_key: Option<String>,
    api_url: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(settings: &OllamaSettings, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            api_url: settings.api_url.clone(),
            timeout,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn post_generate(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::blocking::Response, BackendError> {
        let url = format!("{}{}", self.api_url, endpoints::GENERATE);
        debug!("Ollama request to: {} (stream={})", url, stream);

        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().map_err(|e| map_http_error(e, self.timeout))?;
        check_status(response)
    }
}

impl Backend for OllamaClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let url = format!("{}{}", self.api_url, endpoints::TAGS);
        debug!("Fetching Ollama models: {}", url);

        let mut req = self.client.get(&url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().map_err(|e| map_http_error(e, self.timeout))?;
        let data: OllamaModelsResponse = check_status(response)?
            .json()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let models: Vec<ModelInfo> = data
            .models
            .unwrap_or_default()
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.clone(),
                name: m.name,
                description: m.details.and_then(|d| d.family),
            })
            .collect();

        info!("Fetched {} models from Ollama", models.len());
        Ok(models)
    }

    fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        info!("Ollama generate: model={}, endpoint={}", request.model, self.api_url);

        let result: OllamaGenerateResponse = self
            .post_generate(request, false)?
            .json()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        if let Some(error) = result.error {
            return Err(BackendError::Malformed(error));
        }

        let usage = match (result.prompt_eval_count, result.eval_count) {
            (None, None) => None,
            (prompt, eval) => {
                let prompt_tokens = prompt.unwrap_or(0);
                let completion_tokens = eval.unwrap_or(0);
                Some(TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                })
            }
        };

        Ok(Completion {
            text: result.response,
            model: result.model.unwrap_or_else(|| request.model.clone()),
            finish_reason: result.done_reason,
            usage,
        })
    }

    fn stream(
        &self,
        request: &CompletionRequest,
        sink: &mut dyn FnMut(String) -> bool,
    ) -> Result<(), BackendError> {
        info!("Ollama stream: model={}, endpoint={}", request.model, self.api_url);

        let response = self.post_generate(request, true)?;
        let reader = BufReader::new(response);

        for line in reader.lines() {
            let line = line.map_err(|e| BackendError::Transport(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let chunk = parse_stream_line(&line)?;
            if !chunk.response.is_empty() && !sink(chunk.response) {
                debug!("Ollama stream consumer went away, stopping");
                break;
            }
            if chunk.done {
                break;
            }
        }

        Ok(())
    }
}

fn parse_stream_line(line: &str) -> Result<OllamaGenerateResponse, BackendError> {
    let chunk: OllamaGenerateResponse = serde_json::from_str(line)
        .map_err(|e| BackendError::Malformed(format!("bad stream line: {}", e)))?;
    match chunk.error {
        Some(error) => Err(BackendError::Malformed(error)),
        None => Ok(chunk),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_line() {
        let chunk =
            parse_stream_line(r#"{"model":"llama3.2","response":"Hel","done":false}"#).unwrap();
        assert_eq!(chunk.response, "Hel");
        assert!(!chunk.done);

        let last = parse_stream_line(r#"{"model":"llama3.2","response":"","done":true,"done_reason":"stop"}"#)
            .unwrap();
        assert!(last.done);
        assert_eq!(last.done_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_stream_error_line() {
        let err = parse_stream_line(r#"{"error":"model not found"}"#).unwrap_err();
        assert_eq!(err, BackendError::Malformed("model not found".to_string()));
    }

    #[test]
    fn test_request_body_shape() {
        let request = CompletionRequest::new("llama3.2", "hi").with_max_tokens(64);
        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: None,
            stream: true,
            options: OllamaOptions {
                temperature: None,
                num_predict: request.max_tokens,
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "llama3.2",
                "prompt": "hi",
                "stream": true,
                "options": {"num_predict": 64}
            })
        );
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        let client = OllamaClient::new(
            &OllamaSettings {
                api_url: "http://127.0.0.1:9".to_string(),
                api_key: None,
            },
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client
            .complete(&CompletionRequest::new("llama3.2", "hi"))
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Transport(_) | BackendError::Timeout(_)
        ));
    }
}
