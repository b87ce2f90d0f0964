//! Route Registry
//!
//! Every integration is one [`RouteSpec`]: where it lives, which backend and
//! templates it uses, what its input looks like and how it answers. The
//! registry is built once at startup, either from the built-in set or from a
//! TOML file (`RELAY_ROUTES_FILE`):
//!
//! ```toml
//! [[routes]]
//! namespace = "jokes"
//! capability = "tell"
//! backend = "default"
//! prompt_template = "jokes/prompt.j2"
//! response_template = "jokes/response.j2"
//! fallback_message = "Sorry, no jokes right now."
//! allow_get = true
//!
//! [[routes.input]]
//! name = "query"
//! kind = "string"
//! max_length = 200
//! ```

use relay_backends::{registry::DEFAULT_BACKEND, BackendRegistry};
use relay_core::{Error, MessageType, TemplateResolver, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// First path segments owned by the gateway itself
const RESERVED_NAMESPACES: &[&str] = &["api", "files"];

/// JSON type of one input field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }

    /// Interpret a query-string value
    fn coerce(self, raw: &str) -> Value {
        let parsed = match self {
            FieldKind::Integer => raw.parse::<i64>().ok().map(Value::from),
            FieldKind::Number => raw.parse::<f64>().ok().map(Value::from),
            FieldKind::Boolean => raw.parse::<bool>().ok().map(Value::from),
            FieldKind::Array | FieldKind::Object => serde_json::from_str(raw).ok(),
            FieldKind::String => None,
        };
        parsed.unwrap_or_else(|| Value::String(raw.to_string()))
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn default_true() -> bool {
    true
}

/// One input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Maximum characters (strings) or items (arrays)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            max_length: None,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn check(&self, value: &Value) -> Result<(), ValidationError> {
        if !self.kind.matches(value) {
            return Err(ValidationError::WrongType {
                field: self.name.clone(),
                expected: self.kind.name(),
            });
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let (Some(max), Some(length)) = (self.max_length, length) {
            if length > max {
                return Err(ValidationError::TooLong {
                    field: self.name.clone(),
                    max,
                });
            }
        }
        Ok(())
    }
}

/// Request body schema of a route
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check `body` and return the normalized input.
    ///
    /// Unknown fields are rejected. Absent or null optional fields take their
    /// default, or `null` so templates can test for them.
    pub fn validate(&self, body: &Value) -> Result<Map<String, Value>, ValidationError> {
        let object = body.as_object().ok_or(ValidationError::NotAnObject)?;

        if let Some(unknown) = object.keys().find(|k| self.field(k).is_none()) {
            return Err(ValidationError::UnknownField(unknown.clone()));
        }

        let mut input = Map::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = match object.get(&field.name) {
                Some(value) if !value.is_null() => {
                    field.check(value)?;
                    value.clone()
                }
                _ => match (&field.default, field.required) {
                    (Some(default), _) => default.clone(),
                    (None, true) => return Err(ValidationError::MissingField(field.name.clone())),
                    (None, false) => Value::Null,
                },
            };
            input.insert(field.name.clone(), value);
        }
        Ok(input)
    }

    /// Build a JSON body from query parameters, typed by the schema.
    /// Values that do not parse stay strings so `validate` reports them.
    pub fn coerce_query(&self, params: &HashMap<String, String>) -> Value {
        let object: Map<String, Value> = params
            .iter()
            .map(|(key, raw)| {
                let value = match self.field(key) {
                    Some(field) => field.kind.coerce(raw),
                    None => Value::String(raw.clone()),
                };
                (key.clone(), value)
            })
            .collect();
        Value::Object(object)
    }
}

/// How a route delivers its result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputMode {
    /// One envelope
    #[default]
    Single,
    /// NDJSON events, one per produced chunk
    Stream {
        #[serde(default)]
        interval_ms: u64,
    },
    /// Rendered output written to a file; the envelope carries its URL
    Artifact { extension: String },
}

impl OutputMode {
    pub fn name(&self) -> &'static str {
        match self {
            OutputMode::Single => "single",
            OutputMode::Stream { .. } => "stream",
            OutputMode::Artifact { .. } => "artifact",
        }
    }
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

/// One integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
    pub namespace: String,
    pub capability: String,
    #[serde(default)]
    pub description: String,
    /// Backend name, or `default`
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Model override; `ASSISTANTS_DEFAULT_MODEL_ID_OR_NAME` otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub input: InputSchema,
    pub prompt_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_template: Option<String>,
    pub response_template: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub mode: OutputMode,
    /// Business-level reply used when the backend fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_message: Option<String>,
    #[serde(default)]
    pub allow_get: bool,
    /// Expose the backend's model list to the prompt as `models`
    #[serde(default)]
    pub include_models: bool,
}

impl RouteSpec {
    pub fn new(
        namespace: impl Into<String>,
        capability: impl Into<String>,
        prompt_template: impl Into<String>,
        response_template: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            capability: capability.into(),
            description: String::new(),
            backend: default_backend(),
            model: None,
            temperature: None,
            max_tokens: None,
            input: InputSchema::default(),
            prompt_template: prompt_template.into(),
            system_template: None,
            response_template: response_template.into(),
            message_type: MessageType::Text,
            mode: OutputMode::Single,
            fallback_message: None,
            allow_get: false,
            include_models: false,
        }
    }

    pub fn path(&self) -> String {
        format!("/{}/{}/invoke", self.namespace, self.capability)
    }

    pub fn methods(&self) -> &'static [&'static str] {
        if self.allow_get {
            &["GET", "POST"]
        } else {
            &["POST"]
        }
    }

    fn templates(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.prompt_template.as_str()),
            self.system_template.as_deref(),
            Some(self.response_template.as_str()),
        ]
        .into_iter()
        .flatten()
    }
}

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoutesFile {
    #[serde(default)]
    routes: Vec<RouteSpec>,
}

/// All routes, keyed by (namespace, capability)
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: BTreeMap<(String, String), Arc<RouteSpec>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, rejecting malformed paths and duplicates
    pub fn from_routes(routes: impl IntoIterator<Item = RouteSpec>) -> Result<Self, Error> {
        let mut registry = Self::new();
        for route in routes {
            registry.insert(route)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, route: RouteSpec) -> Result<(), Error> {
        if !is_segment(&route.namespace) || !is_segment(&route.capability) {
            return Err(Error::config(format!(
                "Invalid route path {}: segments must be [A-Za-z0-9_-]+",
                route.path()
            )));
        }
        if RESERVED_NAMESPACES.contains(&route.namespace.as_str()) {
            return Err(Error::config(format!(
                "Route {} uses reserved namespace '{}'",
                route.path(),
                route.namespace
            )));
        }

        if let OutputMode::Artifact { ref extension } = route.mode {
            if !is_segment(extension) {
                return Err(Error::config(format!(
                    "Route {} has invalid artifact extension '{}'",
                    route.path(),
                    extension
                )));
            }
        }

        if let Some(temperature) = route.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(Error::config(format!(
                    "Route {} has temperature {} outside 0.0..=2.0",
                    route.path(),
                    temperature
                )));
            }
        }

        let key = (route.namespace.clone(), route.capability.clone());
        if self.routes.contains_key(&key) {
            return Err(Error::config(format!("Duplicate route {}", route.path())));
        }
        self.routes.insert(key, Arc::new(route));
        Ok(())
    }

    /// Parse a `[[routes]]` TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, Error> {
        let file: RoutesFile = toml::from_str(source)
            .map_err(|e| Error::config(format!("Invalid routes file: {}", e)))?;
        Self::from_routes(file.routes)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let source = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read routes file {}: {}", path.display(), e))
        })?;
        let registry = Self::from_toml_str(&source)?;
        info!(
            "📋 Loaded {} routes from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Fail fast on routes naming backends or templates that do not exist
    pub fn verify(
        &self,
        templates: &TemplateResolver,
        backends: &BackendRegistry,
    ) -> Result<(), Error> {
        for route in self.routes.values() {
            if !backends.contains(&route.backend) {
                return Err(Error::config(format!(
                    "Route {} uses unknown backend '{}'",
                    route.path(),
                    route.backend
                )));
            }
            if let Some(missing) = route.templates().find(|t| !templates.contains(t)) {
                return Err(Error::config(format!(
                    "Route {} uses unknown template '{}'",
                    route.path(),
                    missing
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, namespace: &str, capability: &str) -> Option<Arc<RouteSpec>> {
        self.routes
            .get(&(namespace.to_string(), capability.to_string()))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteSpec> {
        self.routes.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// The integrations shipped with the gateway
    pub fn builtin() -> Self {
        let mut jokes = RouteSpec::new("jokes", "tell", "jokes/prompt.j2", "jokes/response.j2");
        jokes.description = "Tell a joke about a topic".to_string();
        jokes.input = InputSchema::new(vec![
            FieldSpec::required("query", FieldKind::String).max_length(200)
        ]);
        jokes.fallback_message =
            Some("Sorry, I couldn't think of a joke right now. Please try again later.".to_string());
        jokes.allow_get = true;

        let mut lines = RouteSpec::new("text", "lines", "text/prompt.j2", "text/line.j2");
        lines.description = "Stream the lines of a text back one event at a time".to_string();
        lines.backend = "echo".to_string();
        lines.input = InputSchema::new(vec![FieldSpec::required("text", FieldKind::String)]);
        lines.mode = OutputMode::Stream { interval_ms: 100 };

        let mut chat = RouteSpec::new("chat", "complete", "chat/prompt.j2", "chat/response.j2");
        chat.description = "Single-turn completion from the default backend".to_string();
        chat.system_template = Some("chat/system.j2".to_string());
        chat.input = InputSchema::new(vec![
            FieldSpec::required("prompt", FieldKind::String),
            FieldSpec::optional("system", FieldKind::String),
        ]);

        let mut chat_stream = RouteSpec::new("chat", "stream", "chat/prompt.j2", "chat/chunk.j2");
        chat_stream.description = "Completion streamed as it is produced".to_string();
        chat_stream.input = InputSchema::new(vec![FieldSpec::required("prompt", FieldKind::String)]);
        chat_stream.mode = OutputMode::Stream { interval_ms: 0 };

        let mut export = RouteSpec::new(
            "documents",
            "export",
            "documents/prompt.j2",
            "documents/response.j2",
        );
        export.description = "Render a Markdown document and return a download link".to_string();
        export.backend = "echo".to_string();
        export.input = InputSchema::new(vec![
            FieldSpec::required("title", FieldKind::String).max_length(200),
            FieldSpec::required("body", FieldKind::String),
        ]);
        export.message_type = MessageType::Url;
        export.mode = OutputMode::Artifact {
            extension: "md".to_string(),
        };

        let mut registry = Self::new();
        for route in [jokes, lines, chat, chat_stream, export] {
            let key = (route.namespace.clone(), route.capability.clone());
            registry.routes.insert(key, Arc::new(route));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> InputSchema {
        InputSchema::new(vec![
            FieldSpec::required("query", FieldKind::String).max_length(5),
            FieldSpec::optional("limit", FieldKind::Integer).default_value(json!(3)),
            FieldSpec::optional("system", FieldKind::String),
        ])
    }

    #[test]
    fn test_validate_applies_defaults() {
        let input = schema().validate(&json!({"query": "cats"})).unwrap();
        assert_eq!(input["query"], "cats");
        assert_eq!(input["limit"], 3);
        assert_eq!(input["system"], Value::Null);
    }

    #[test]
    fn test_validate_rejections() {
        let schema = schema();
        assert_eq!(
            schema.validate(&json!([1])).unwrap_err(),
            ValidationError::NotAnObject
        );
        assert_eq!(
            schema.validate(&json!({})).unwrap_err(),
            ValidationError::MissingField("query".to_string())
        );
        assert_eq!(
            schema.validate(&json!({"query": "a", "extra": 1})).unwrap_err(),
            ValidationError::UnknownField("extra".to_string())
        );
        assert_eq!(
            schema.validate(&json!({"query": 7})).unwrap_err(),
            ValidationError::WrongType {
                field: "query".to_string(),
                expected: "string"
            }
        );
        assert_eq!(
            schema.validate(&json!({"query": "toolong"})).unwrap_err(),
            ValidationError::TooLong {
                field: "query".to_string(),
                max: 5
            }
        );
        assert!(schema
            .validate(&json!({"query": "a", "limit": 1.5}))
            .is_err());
    }

    #[test]
    fn test_query_coercion() {
        let params = HashMap::from([
            ("query".to_string(), "dogs".to_string()),
            ("limit".to_string(), "10".to_string()),
        ]);
        let body = schema().coerce_query(&params);
        assert_eq!(body, json!({"query": "dogs", "limit": 10}));

        let params = HashMap::from([("limit".to_string(), "ten".to_string())]);
        assert_eq!(schema().coerce_query(&params)["limit"], "ten");
    }

    #[test]
    fn test_routes_from_toml() {
        let registry = RouteRegistry::from_toml_str(
            r#"
            [[routes]]
            namespace = "weather"
            capability = "forecast"
            backend = "echo"
            prompt_template = "w/prompt.j2"
            response_template = "w/response.j2"
            mode = { kind = "stream", interval_ms = 50 }

            [[routes.input]]
            name = "city"
            max_length = 40

            [[routes.input]]
            name = "days"
            kind = "integer"
            required = false
            default = 1
            "#,
        )
        .unwrap();

        let route = registry.get("weather", "forecast").unwrap();
        assert_eq!(route.path(), "/weather/forecast/invoke");
        assert_eq!(route.mode, OutputMode::Stream { interval_ms: 50 });
        assert_eq!(route.input.fields().len(), 2);
        assert_eq!(route.input.fields()[1].default, Some(json!(1)));
        assert_eq!(route.message_type, MessageType::Text);
    }

    #[test]
    fn test_toml_rejects_unknown_keys_and_duplicates() {
        let unknown = r#"
            [[routes]]
            namespace = "a"
            capability = "b"
            prompt_template = "p"
            response_template = "r"
            colour = "blue"
        "#;
        assert!(matches!(
            RouteRegistry::from_toml_str(unknown),
            Err(Error::Config(_))
        ));

        let duplicate = r#"
            [[routes]]
            namespace = "a"
            capability = "b"
            prompt_template = "p"
            response_template = "r"

            [[routes]]
            namespace = "a"
            capability = "b"
            prompt_template = "p"
            response_template = "r"
        "#;
        let err = RouteRegistry::from_toml_str(duplicate).unwrap_err();
        assert!(err.to_string().contains("Duplicate route /a/b/invoke"));
    }

    #[test]
    fn test_sampling_options() {
        let source = r#"
            [[routes]]
            namespace = "poems"
            capability = "write"
            prompt_template = "p"
            response_template = "r"
            temperature = 0.9
            max_tokens = 256
        "#;
        let registry = RouteRegistry::from_toml_str(source).unwrap();
        let route = registry.get("poems", "write").unwrap();
        assert_eq!(route.temperature, Some(0.9));
        assert_eq!(route.max_tokens, Some(256));

        let mut route = RouteSpec::new("poems", "write", "p", "r");
        route.temperature = Some(3.5);
        let err = RouteRegistry::from_routes([route]).unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_reserved_and_invalid_paths() {
        let route = RouteSpec::new("api", "health", "p", "r");
        assert!(RouteRegistry::from_routes([route]).is_err());

        let route = RouteSpec::new("bad/ns", "x", "p", "r");
        assert!(RouteRegistry::from_routes([route]).is_err());
    }

    #[test]
    fn test_verify_checks_backends_and_templates() {
        let templates = crate::templates::builtin().unwrap();
        let backends = BackendRegistry::echo_only();
        RouteRegistry::builtin()
            .verify(&templates, &backends)
            .unwrap();

        let mut route = RouteSpec::new("x", "y", "jokes/prompt.j2", "missing.j2");
        route.backend = "echo".to_string();
        let err = RouteRegistry::from_routes([route])
            .unwrap()
            .verify(&templates, &backends)
            .unwrap_err();
        assert!(err.to_string().contains("missing.j2"));

        let mut route = RouteSpec::new("x", "y", "jokes/prompt.j2", "jokes/response.j2");
        route.backend = "ollama".to_string();
        assert!(RouteRegistry::from_routes([route])
            .unwrap()
            .verify(&templates, &backends)
            .is_err());
    }

    #[test]
    fn test_example_routes_file_is_valid() {
        let registry =
            RouteRegistry::from_toml_str(include_str!("../routes.example.toml")).unwrap();
        let templates = crate::templates::builtin().unwrap();
        registry
            .verify(&templates, &BackendRegistry::echo_only())
            .unwrap();
        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.get("documents", "export").unwrap().mode,
            OutputMode::Artifact {
                extension: "md".to_string()
            }
        );
    }

    #[test]
    fn test_builtin_routes() {
        let registry = RouteRegistry::builtin();
        assert_eq!(registry.len(), 5);
        assert!(registry.get("jokes", "tell").unwrap().allow_get);
        assert_eq!(
            registry.get("text", "lines").unwrap().mode,
            OutputMode::Stream { interval_ms: 100 }
        );
        assert!(registry.get("nope", "nope").is_none());
    }
}
