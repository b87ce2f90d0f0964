//! Backend Registry
//!
//! Named backends built once from `GatewayConfig`. Routes refer to backends by
//! name; the reserved name `default` resolves to the configured default.
//!
//! Remote clients own a blocking HTTP runtime, so the registry must be built
//! outside async contexts (e.g. via `spawn_blocking`).

use relay_core::{Error, GatewayConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::SharedBackend;
use crate::echo::EchoBackend;
use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;

/// Name routes use to select the configured default backend
pub const DEFAULT_BACKEND: &str = "default";

pub struct BackendRegistry {
    backends: BTreeMap<String, SharedBackend>,
    default: String,
}

impl BackendRegistry {
    /// Registry holding only the echo backend
    pub fn echo_only() -> Self {
        let mut backends: BTreeMap<String, SharedBackend> = BTreeMap::new();
        backends.insert("echo".to_string(), Arc::new(EchoBackend::new()));
        Self {
            backends,
            default: "echo".to_string(),
        }
    }

    /// Build every configured backend.
    ///
    /// Echo is always present. The default is `RELAY_DEFAULT_BACKEND` if set,
    /// otherwise Ollama, then OpenAI, then echo.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, Error> {
        let mut registry = Self::echo_only();
        let mut preferred = None;

        if let Some(ref settings) = config.ollama {
            let client = OllamaClient::new(settings, config.default_timeout)?;
            info!("✅ Ollama backend initialized ({})", client.api_url());
            registry.insert("ollama", Arc::new(client));
            preferred.get_or_insert("ollama");
        } else {
            debug!("Ollama backend not available (OLLAMA_API_URL not set)");
        }

        if let Some(ref settings) = config.openai {
            let client = OpenAiClient::new(settings, config.default_timeout)?;
            info!(
                "✅ OpenAI backend initialized ({}{})",
                settings.base_url,
                if client.is_azure() { ", azure" } else { "" }
            );
            registry.insert("openai", Arc::new(client));
            preferred.get_or_insert("openai");
        } else {
            debug!("OpenAI backend not available (OPENAI_API_KEY / OPENAI_BASE_URL not set)");
        }

        let default = match config.default_backend {
            Some(ref name) => name.clone(),
            None => preferred.unwrap_or("echo").to_string(),
        };
        registry.set_default(default)?;

        info!("📊 Default backend: {}", registry.default);
        info!("📊 Total backends available: {}", registry.backends.len());
        Ok(registry)
    }

    /// Add or replace a backend
    pub fn insert(&mut self, name: impl Into<String>, backend: SharedBackend) {
        self.backends.insert(name.into(), backend);
    }

    /// Change the default; the name must already be registered
    pub fn set_default(&mut self, name: impl Into<String>) -> Result<(), Error> {
        let name = name.into();
        if !self.backends.contains_key(&name) {
            return Err(Error::config(format!(
                "Default backend '{}' not available. Available: {:?}",
                name,
                self.names().collect::<Vec<_>>()
            )));
        }
        self.default = name;
        Ok(())
    }

    /// Resolve a route's backend name (`default` allowed)
    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        let name = self.resolve_name(name);
        self.backends.get(name).cloned()
    }

    /// Concrete name behind `name`, following the `default` alias
    pub fn resolve_name<'a>(&'a self, name: &'a str) -> &'a str {
        if name == DEFAULT_BACKEND {
            &self.default
        } else {
            name
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(self.resolve_name(name))
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}
