//! relay-backends: Blocking Backend Clients
//!
//! ## Supported Backends & Endpoints
//!
//! | Backend | Base URL | Auth Method |
//! |---------|----------|-------------|
//! | Ollama | `OLLAMA_API_URL` (e.g. `http://localhost:11434`) | optional `Bearer {OLLAMA_API_KEY}` |
//! | OpenAI | `OPENAI_BASE_URL` (default `https://api.openai.com/v1`) | `Bearer {OPENAI_API_KEY}` |
//! | Azure OpenAI | `OPENAI_BASE_URL` + `AZURE_OPENAI_API_VERSION` | `api-key: {OPENAI_API_KEY}` |
//! | Echo | in-process | none |
//!
//! Every client is synchronous. Handlers never call them directly; calls go
//! through `relay_core::Dispatcher`, which bounds how many run at once.

pub mod backend;
pub mod echo;
pub mod ollama;
pub mod openai;
pub mod registry;

pub use backend::{
    Backend, BackendKind, Completion, CompletionRequest, ModelInfo, SharedBackend, TokenUsage,
};
pub use echo::EchoBackend;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use registry::BackendRegistry;

