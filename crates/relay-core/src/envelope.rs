//! Invocation envelope
//!
//! Every route answers with the same wrapper:
//!
//! ```json
//! {"status": "success", "invocationId": "...", "response": [{"message": "...", "type": "text"}]}
//! ```
//!
//! A success envelope is always built from at least one message, so an empty
//! `response` can only ever accompany `status: "error"`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque per-request identifier used for correlation and logging only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// How the `message` payload should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Url,
    Code,
    Html,
    Json,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::Image => write!(f, "image"),
            MessageType::Url => write!(f, "url"),
            MessageType::Code => write!(f, "code"),
            MessageType::Html => write!(f, "html"),
            MessageType::Json => write!(f, "json"),
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "url" => Ok(MessageType::Url),
            "code" => Ok(MessageType::Code),
            "html" => Ok(MessageType::Html),
            "json" => Ok(MessageType::Json),
            other => Err(format!("Unknown message type: {}", other)),
        }
    }
}

/// One entry of an envelope's `response` array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub message: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

impl ResponseMessage {
    pub fn new(message: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            message: message.into(),
            message_type,
        }
    }

    pub fn text(message: impl Into<String>) -> Self {
        Self::new(message, MessageType::Text)
    }

    pub fn url(message: impl Into<String>) -> Self {
        Self::new(message, MessageType::Url)
    }
}

/// Non-streaming response wrapper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    status: Status,
    #[serde(rename = "invocationId")]
    invocation_id: InvocationId,
    response: Vec<ResponseMessage>,
}

impl Envelope {
    /// Successful envelope; `first` guarantees a non-empty response
    pub fn success(invocation_id: InvocationId, first: ResponseMessage) -> Self {
        Self {
            status: Status::Success,
            invocation_id,
            response: vec![first],
        }
    }

    /// Error envelope carrying a human-readable message
    pub fn error(invocation_id: InvocationId, message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            invocation_id,
            response: vec![ResponseMessage::text(message)],
        }
    }

    /// Append another message (builder style, before serialization)
    pub fn with_message(mut self, message: ResponseMessage) -> Self {
        self.response.push(message);
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }

    pub fn response(&self) -> &[ResponseMessage] {
        &self.response
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
