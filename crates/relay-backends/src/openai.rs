//! OpenAI-compatible Chat Completions Client
//!
//! Covers api.openai.com, Azure OpenAI deployments and self-hosted servers
//! that speak the same protocol.
//!
//! | Flavor | Chat URL | Auth |
//! |--------|----------|------|
//! | OpenAI | `{base}/chat/completions` | `Authorization: Bearer {key}` |
//! | Azure | `{base}/openai/deployments/{model}/chat/completions?api-version={v}` | `api-key: {key}` |
//!
//! Streaming uses server-sent `data:` lines terminated by `data: [DONE]`.

use relay_core::config::OpenAiSettings;
use relay_core::BackendError;
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::{
    check_status, map_http_error, Backend, BackendKind, Completion, CompletionRequest, ModelInfo,
    TokenUsage,
};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    delta: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    owned_by: Option<String>,
}

/// One parsed server-sent line
#[derive(Debug, PartialEq)]
enum SseLine {
    Chunk(String),
    Done,
    Skip,
}

pub struct OpenAiClient {
    client: Client,
    settings: OpenAiSettings,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(settings: &OpenAiSettings, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            settings: settings.clone(),
            timeout,
        })
    }

    pub fn is_azure(&self) -> bool {
        self.settings.azure_api_version.is_some()
    }

    fn chat_url(&self, model: &str) -> String {
        match self.settings.azure_api_version {
            Some(ref version) => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.settings.base_url, model, version
            ),
            None => format!("{}/chat/completions", self.settings.base_url),
        }
    }

    fn models_url(&self) -> String {
        match self.settings.azure_api_version {
            Some(ref version) => format!(
                "{}/openai/models?api-version={}",
                self.settings.base_url, version
            ),
            None => format!("{}/models", self.settings.base_url),
        }
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match (&self.settings.api_key, self.is_azure()) {
            (Some(key), true) => req.header("api-key", key),
            (Some(key), false) => req.bearer_auth(key),
            (None, _) => req,
        }
    }

    fn post_chat(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::blocking::Response, BackendError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatCompletionRequest {
            // Azure selects the model through the deployment path
            model: (!self.is_azure()).then_some(request.model.as_str()),
            messages,
            stream,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let url = self.chat_url(&request.model);
        debug!("OpenAI request to: {} (stream={})", url, stream);

        let response = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .map_err(|e| map_http_error(e, self.timeout))?;
        check_status(response)
    }
}

impl Backend for OpenAiClient {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let response = self
            .authorize(self.client.get(self.models_url()))
            .send()
            .map_err(|e| map_http_error(e, self.timeout))?;
        let data: ModelsResponse = check_status(response)?
            .json()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        Ok(data
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.id.clone(),
                id: m.id,
                description: m.owned_by,
            })
            .collect())
    }

    fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        info!("OpenAI chat: model={}, azure={}", request.model, self.is_azure());

        let result: ChatCompletionResponse = self
            .post_chat(request, false)?
            .json()
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let choice = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Malformed("response has no choices".to_string()))?;

        let text = choice
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| BackendError::Malformed("choice has no content".to_string()))?;

        Ok(Completion {
            text,
            model: result.model.unwrap_or_else(|| request.model.clone()),
            finish_reason: choice.finish_reason,
            usage: result.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    fn stream(
        &self,
        request: &CompletionRequest,
        sink: &mut dyn FnMut(String) -> bool,
    ) -> Result<(), BackendError> {
        info!("OpenAI stream: model={}, azure={}", request.model, self.is_azure());

        let reader = BufReader::new(self.post_chat(request, true)?);
        for line in reader.lines() {
            let line = line.map_err(|e| BackendError::Transport(e.to_string()))?;
            match parse_sse_line(&line)? {
                SseLine::Chunk(text) => {
                    if !sink(text) {
                        debug!("OpenAI stream consumer went away, stopping");
                        break;
                    }
                }
                SseLine::Done => break,
                SseLine::Skip => {}
            }
        }
        Ok(())
    }
}

fn parse_sse_line(line: &str) -> Result<SseLine, BackendError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }

    let chunk: ChatCompletionResponse = serde_json::from_str(data)
        .map_err(|e| BackendError::Malformed(format!("bad stream chunk: {}", e)))?;

    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .unwrap_or_default();

    if text.is_empty() {
        Ok(SseLine::Skip)
    } else {
        Ok(SseLine::Chunk(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(azure: Option<&str>) -> OpenAiClient {
        OpenAiClient::new(
            &OpenAiSettings {
                base_url: "https://example.openai.azure.com".to_string(),
                api_key: Some("secret".to_string()),
                azure_api_version: azure.map(str::to_string),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let plain = client(None);
        assert_eq!(
            plain.chat_url("gpt-4o"),
            "https://example.openai.azure.com/chat/completions"
        );
        assert_eq!(plain.models_url(), "https://example.openai.azure.com/models");

        let azure = client(Some("2024-06-01"));
        assert_eq!(
            azure.chat_url("my-deployment"),
            "https://example.openai.azure.com/openai/deployments/my-deployment/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap(),
            SseLine::Chunk("Hi".to_string())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Skip
        );
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn test_parse_full_response() {
        let body = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "Hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.usage.unwrap().total_tokens, 4);
    }
}
