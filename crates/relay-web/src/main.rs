//! relay-server: Main Entry Point
//!
//! Loads the environment, builds backends, templates and routes once, and
//! serves every integration from a single listener until Ctrl+C / SIGTERM.

use anyhow::Context;
use clap::Parser;
use relay_backends::BackendRegistry;
use relay_core::config::load_environment;
use relay_core::GatewayConfig;
use relay_http::HttpServer;
use relay_web::{create_router, AppContext};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "relay-server", version, about = "Invocation gateway")]
struct Args {
    /// Listen address (host:port or port); overrides RELAY_BIND / PORT
    #[arg(long)]
    bind: Option<String>,

    /// Route registry TOML; overrides RELAY_ROUTES_FILE
    #[arg(long)]
    routes: Option<PathBuf>,

    /// Extra template directory; overrides RELAY_TEMPLATE_DIR
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Artifact output directory; overrides RELAY_ARTIFACT_DIR
    #[arg(long)]
    artifacts: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,relay_web=debug"));
    let json = std::env::var("RELAY_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load environment from /etc/relay/environment or .env (if present)
    let env_file = load_environment();
    init_tracing();
    if let Some(path) = env_file {
        info!("Loaded environment from {}", path);
    }

    let mut config = GatewayConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(routes) = args.routes {
        config.routes_file = Some(routes);
    }
    if let Some(templates) = args.templates {
        config.template_dir = Some(templates);
    }
    if let Some(artifacts) = args.artifacts {
        config.artifact_dir = artifacts;
    }

    info!("Starting relay-server v{}", env!("CARGO_PKG_VERSION"));

    // Remote clients carry their own blocking runtime; build them off the async workers
    let backend_config = config.clone();
    let backends =
        tokio::task::spawn_blocking(move || BackendRegistry::from_config(&backend_config))
            .await
            .context("backend initialization task failed")??;

    let ctx = AppContext::from_config(config, backends)?.shared();
    let dispatcher = ctx.dispatcher.clone();

    // The router answers expired requests with an error envelope itself
    let server = HttpServer::builder()
        .bind(ctx.config.bind.clone())
        .without_timeout()
        .router(create_router(ctx.clone()))
        .build()?;

    info!("📡 Routes:  {}/api/routes", ctx.config.server_name);
    info!("📊 Health:  {}/api/health", ctx.config.server_name);

    server.serve().await?;

    dispatcher.close();
    info!("Server shutdown complete");
    Ok(())
}
