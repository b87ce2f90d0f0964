//! Application context shared by every handler

use chrono::{DateTime, Utc};
use relay_backends::BackendRegistry;
use relay_core::{Dispatcher, Error, GatewayConfig, Redactor, TemplateResolver};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::registry::RouteRegistry;
use crate::templates;

pub type SharedContext = Arc<AppContext>;

/// Process-wide state, built once at startup and never mutated
pub struct AppContext {
    pub config: GatewayConfig,
    pub dispatcher: Dispatcher,
    pub templates: TemplateResolver,
    pub backends: BackendRegistry,
    pub routes: RouteRegistry,
    pub redactor: Redactor,
    pub started_at: DateTime<Utc>,
    start_time: Instant,
}

impl AppContext {
    /// Assemble a context from prepared parts. Routes are not verified here.
    pub fn new(
        config: GatewayConfig,
        templates: TemplateResolver,
        backends: BackendRegistry,
        routes: RouteRegistry,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(config.max_threads),
            redactor: config.redactor(),
            config,
            templates,
            backends,
            routes,
            started_at: Utc::now(),
            start_time: Instant::now(),
        }
    }

    /// Load templates and routes named by `config` and check that every
    /// route refers to a known backend and existing templates
    pub fn from_config(config: GatewayConfig, backends: BackendRegistry) -> Result<Self, Error> {
        let templates = templates::load(config.template_dir.as_deref())?;
        let routes = match config.routes_file {
            Some(ref path) => RouteRegistry::load(path)?,
            None => RouteRegistry::builtin(),
        };
        routes.verify(&templates, &backends)?;

        info!("✅ {} routes registered", routes.len());
        info!(
            "✅ Dispatcher: {} concurrent backend calls",
            config.max_threads
        );
        Ok(Self::new(config, templates, backends, routes))
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(self)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Time a request gets to produce response headers. Single-envelope
    /// routes answer only after the backend returns, possibly after queueing
    /// for a dispatcher permit, so this is a multiple of the backend timeout.
    pub fn response_deadline(&self) -> Duration {
        self.config.default_timeout * 4
    }
}
