//! relay-http: HTTP Server for the relay gateway
//!
//! Integrations export routers that get composed here, wrapped in one shared
//! middleware stack and served by a single listener.
//!
//! Architecture:
//! ```text
//! relay-server binary
//!     └── relay-http (this crate)
//!         ├── Middleware stack (CORS, tracing, compression, timeout, logging)
//!         ├── NDJSON streaming bodies
//!         └── Router composition
//!             ├── /api/*                         → introspection
//!             ├── /<namespace>/<capability>/invoke → integrations
//!             └── /files/*                       → generated artifacts
//! ```

pub mod middleware;
pub mod ndjson;
pub mod router;
pub mod server;

// Re-export main types
pub use middleware::{apply_middleware, MiddlewareConfig, MiddlewareStack};
pub use ndjson::{NdjsonSender, NdjsonStream, NDJSON_CONTENT_TYPE};
pub use router::{RouterBuilder, ServiceRouter};
pub use server::{shutdown_signal, HttpServer, HttpServerBuilder, ServerConfig};

// Re-export axum for convenience - other crates use this
pub use axum;
pub use tower;
pub use tower_http;

/// Error types for the HTTP server
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server binding error: {0}")]
    BindError(#[from] std::io::Error),

    #[error("Invalid bind address '{0}'")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

