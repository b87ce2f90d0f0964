//! In-process echo backend
//!
//! Returns the rendered prompt unchanged. Routes that only template and
//! reshape their input (line streaming, document export) use it, and it is
//! the fallback default when no remote backend is configured.

use relay_core::BackendError;

use crate::backend::{Backend, BackendKind, Completion, CompletionRequest, ModelInfo};

#[derive(Debug, Clone, Default)]
pub struct EchoBackend;

impl EchoBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for EchoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Echo
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        Ok(vec![ModelInfo::named("echo")])
    }

    fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        Ok(Completion {
            text: request.prompt.clone(),
            model: "echo".to_string(),
            finish_reason: Some("stop".to_string()),
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_returns_prompt() {
        let request = CompletionRequest::new("any", "hello\nworld").with_system("ignored");
        let completion = EchoBackend::new().complete(&request).unwrap();
        assert_eq!(completion.text, "hello\nworld");
        assert_eq!(completion.model, "echo");
    }
}
