//! Environment Configuration
//!
//! Configuration is read from the process environment once at startup and
//! frozen into a [`GatewayConfig`] that handlers receive through the app
//! context.
//!
//! ## Usage
//!
//! Call `load_environment()` early in main() before building the config:
//!
//! ```rust,no_run
//! use relay_core::config::{load_environment, GatewayConfig};
//!
//! load_environment();
//! let config = GatewayConfig::from_env();
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dispatcher::DEFAULT_MAX_THREADS;
use crate::error::Redactor;

/// Alternative paths to check (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &["/etc/relay/environment", ".env"];

/// Outbound call timeout when `DEFAULT_TIMEOUT` is not set
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Model used when neither the route nor the environment names one
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Load environment variables from an env file.
///
/// 1. `RELAY_ENV_FILE` if set
/// 2. `/etc/relay/environment` (system-wide)
/// 3. `.env` in the current directory (development)
///
/// Existing environment variables are never overridden.
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("RELAY_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded_count = 0;
            let mut skipped_count = 0;

            for line in content.lines() {
                let line = line.trim();

                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                if let Some((key, value)) = parse_env_line(line) {
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        loaded_count += 1;
                        debug!(
                            "Loaded: {}={}",
                            key,
                            if is_secret_key(&key) { "***" } else { &value }
                        );
                    } else {
                        skipped_count += 1;
                        debug!("Skipped (already set): {}", key);
                    }
                }
            }

            info!(
                "Loaded {} environment variables from {} ({} skipped - already set)",
                loaded_count, path, skipped_count
            );

            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

/// Parse a single environment line into key-value pair.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    // KEY=VALUE, KEY="VALUE", KEY='VALUE', optionally prefixed with `export `
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

fn is_secret_key(key: &str) -> bool {
    key.contains("KEY") || key.contains("TOKEN") || key.contains("SECRET") || key.contains("HASH")
}

/// Get an optional configuration value (empty counts as unset).
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Settings for the OpenAI-compatible backend (OpenAI, Azure OpenAI, vLLM, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Set for Azure deployments; switches auth header and URL layout
    pub azure_api_version: Option<String>,
}

/// Settings for the Ollama backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaSettings {
    pub api_url: String,
    pub api_key: Option<String>,
}

/// Process-wide configuration, immutable after startup
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Dispatcher pool size (`DEFAULT_MAX_THREADS`)
    pub max_threads: usize,
    /// Timeout applied to every outbound call (`DEFAULT_TIMEOUT`, seconds)
    pub default_timeout: Duration,
    /// `ASSISTANTS_DEFAULT_MODEL_ID_OR_NAME`
    pub default_model: String,
    /// Base URL used when returning links to generated artifacts (`SERVER_NAME`)
    pub server_name: String,
    /// Listen address (`RELAY_BIND`, or `0.0.0.0:$PORT`)
    pub bind: String,
    /// Backend used by routes that name `default` (`RELAY_DEFAULT_BACKEND`)
    pub default_backend: Option<String>,
    pub ollama: Option<OllamaSettings>,
    pub openai: Option<OpenAiSettings>,
    pub template_dir: Option<PathBuf>,
    pub routes_file: Option<PathBuf>,
    pub artifact_dir: PathBuf,
    /// Hex SHA-256 of the access key; `None` disables authentication
    pub access_key_hash: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl GatewayConfig {
    /// Build from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(get_config_opt)
    }

    /// Build from an arbitrary key lookup; empty values must already be filtered out
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_or = |key: &str, default: u64| -> u64 {
            match lookup(key) {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    warn!("Invalid value for {}: {:?}, using {}", key, raw, default);
                    default
                }),
                None => default,
            }
        };

        let max_threads = parse_or("DEFAULT_MAX_THREADS", DEFAULT_MAX_THREADS as u64) as usize;
        let default_timeout = Duration::from_secs(parse_or("DEFAULT_TIMEOUT", DEFAULT_TIMEOUT_SECS));

        let bind = lookup("RELAY_BIND").unwrap_or_else(|| {
            let port = lookup("PORT").unwrap_or_else(|| "8080".to_string());
            format!("0.0.0.0:{}", port)
        });

        let ollama_key = lookup("OLLAMA_API_KEY");
        let ollama = lookup("OLLAMA_API_URL").map(|api_url| OllamaSettings {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: ollama_key,
        });

        let openai_key = lookup("OPENAI_API_KEY");
        let openai = match (lookup("OPENAI_BASE_URL"), openai_key.clone()) {
            (Some(base_url), api_key) => Some(OpenAiSettings {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
                azure_api_version: lookup("AZURE_OPENAI_API_VERSION"),
            }),
            (None, Some(api_key)) => Some(OpenAiSettings {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: Some(api_key),
                azure_api_version: None,
            }),
            (None, None) => None,
        };

        Self {
            max_threads: max_threads.max(1),
            default_timeout,
            default_model: lookup("ASSISTANTS_DEFAULT_MODEL_ID_OR_NAME")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            server_name: lookup("SERVER_NAME")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            bind,
            default_backend: lookup("RELAY_DEFAULT_BACKEND"),
            ollama,
            openai,
            template_dir: lookup("RELAY_TEMPLATE_DIR").map(PathBuf::from),
            routes_file: lookup("RELAY_ROUTES_FILE").map(PathBuf::from),
            artifact_dir: lookup("RELAY_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("artifacts")),
            access_key_hash: lookup("ACCESS_KEY_HASH").map(|h| h.trim().to_lowercase()),
        }
    }

    /// Redactor covering every configured credential
    pub fn redactor(&self) -> Redactor {
        let secrets = self
            .ollama
            .iter()
            .filter_map(|o| o.api_key.clone())
            .chain(self.openai.iter().filter_map(|o| o.api_key.clone()));
        Redactor::new(secrets)
    }

    /// Public URL of an artifact file name
    pub fn artifact_url(&self, file_name: &str) -> String {
        format!("{}/files/{}", self.server_name, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> GatewayConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("FOO=bar").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_quoted() {
        let (k, v) = parse_env_line("export FOO=\"bar baz\"").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar baz");
    }

    #[test]
    fn test_parse_env_line_empty() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("=value").is_none());
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.max_threads, 4);
        assert_eq!(cfg.default_timeout, Duration::from_secs(30));
        assert_eq!(cfg.default_model, "llama3.2");
        assert_eq!(cfg.bind, "0.0.0.0:8080");
        assert!(cfg.ollama.is_none());
        assert!(cfg.openai.is_none());
        assert!(cfg.access_key_hash.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("DEFAULT_MAX_THREADS", "8"),
            ("DEFAULT_TIMEOUT", "5"),
            ("SERVER_NAME", "https://relay.example.com/"),
            ("PORT", "9000"),
            ("OPENAI_API_KEY", "sk-abcdef"),
        ]);
        assert_eq!(cfg.max_threads, 8);
        assert_eq!(cfg.default_timeout, Duration::from_secs(5));
        assert_eq!(cfg.bind, "0.0.0.0:9000");
        assert_eq!(
            cfg.artifact_url("a.md"),
            "https://relay.example.com/files/a.md"
        );
        let openai = cfg.openai.as_ref().unwrap();
        assert_eq!(openai.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.redactor().redact("key sk-abcdef"), "key ***");
    }

    #[test]
    fn test_invalid_number_falls_back() {
        let cfg = config(&[("DEFAULT_MAX_THREADS", "many")]);
        assert_eq!(cfg.max_threads, 4);
    }
}
