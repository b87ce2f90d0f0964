//! relay-web: Invocation routes for the relay gateway
//!
//! Wires the route registry, templates, backends and dispatcher into one axum
//! router. The `relay-server` binary builds an [`AppContext`] from the
//! environment and serves [`create_router`] through `relay-http`.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod registry;
pub mod routes;
pub mod state;
pub mod templates;

pub use error::ApiError;
pub use registry::{FieldKind, FieldSpec, InputSchema, OutputMode, RouteRegistry, RouteSpec};
pub use routes::create_router;
pub use state::{AppContext, SharedContext};
