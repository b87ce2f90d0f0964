//! Core types and utilities for the relay gateway
//!
//! # Modules
//!
//! - `config`: Environment loading and the process-wide `GatewayConfig`
//! - `dispatcher`: Bounded pool for blocking backend calls
//! - `envelope`: The uniform success/error response wrapper
//! - `error`: Error taxonomy and Result alias
//! - `stream`: Newline-delimited streaming events and their emitter
//! - `template`: Named prompt/response templates

pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod stream;
pub mod template;

// Re-exports
pub use config::GatewayConfig;
pub use dispatcher::{DispatchError, Dispatcher};
pub use envelope::{Envelope, InvocationId, MessageType, ResponseMessage, Status};
pub use error::{BackendError, Error, Redactor, Result, TemplateError, ValidationError};
pub use stream::{StreamEmitter, StreamEnvelope, StreamEvent};
pub use template::TemplateResolver;
