//! Central HTTP Server
//!
//! Single listener that serves every integration of the gateway.

use crate::middleware::{apply_middleware, MiddlewareConfig};
use crate::{Result, ServerError};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// HTTP port
    pub http_port: u16,
    /// Bind host
    pub bind_host: String,
    /// Public hostname for logging/display
    pub public_host: String,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.http_port);
        addr.parse()
            .map_err(|_| ServerError::InvalidAddress(addr.clone()))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            bind_host: "0.0.0.0".to_string(),
            public_host: local_hostname(),
        }
    }
}

fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Central HTTP Server
pub struct HttpServer {
    config: ServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new server builder
    pub fn builder() -> HttpServerBuilder {
        HttpServerBuilder::new()
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The fully layered router, for in-process testing
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Bind and serve until `shutdown` resolves; in-flight requests are drained
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(ServerError::BindError)?;

        info!("HTTP server listening on http://{}", addr);
        info!(
            "Public URL: http://{}:{}",
            self.config.public_host, self.config.http_port
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::BindError(std::io::Error::other(e)))?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Serve until the process is interrupted
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Builder for HttpServer
pub struct HttpServerBuilder {
    bind_host: String,
    http_port: u16,
    public_host: Option<String>,
    router: Option<Router>,
    middleware_config: MiddlewareConfig,
    /// Last `bind` argument that had no usable port
    invalid_bind: Option<String>,
}

impl HttpServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            http_port: 8080,
            public_host: None,
            router: None,
            middleware_config: MiddlewareConfig::default(),
            invalid_bind: None,
        }
    }

    /// Set bind address (host:port format or just port)
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let (host, port) = match addr.rsplit_once(':') {
            Some((host, port)) => (Some(host), port),
            None => (None, addr.as_str()),
        };
        match port.parse::<u16>() {
            Ok(port) => {
                if let Some(host) = host {
                    self.bind_host = host.to_string();
                }
                self.http_port = port;
                self.invalid_bind = None;
            }
            Err(_) => self.invalid_bind = Some(addr),
        }
        self
    }

    /// Set public hostname
    pub fn public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = Some(host.into());
        self
    }

    /// Set the router
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Replace the middleware configuration
    pub fn middleware(mut self, config: MiddlewareConfig) -> Self {
        self.middleware_config = config;
        self
    }

    /// Time allowed to produce response headers
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.middleware_config.timeout = Some(timeout);
        self
    }

    /// Leave response deadlines to the router
    pub fn without_timeout(mut self) -> Self {
        self.middleware_config.timeout = None;
        self
    }

    /// Build the server
    pub fn build(self) -> Result<HttpServer> {
        if let Some(addr) = self.invalid_bind {
            return Err(ServerError::InvalidAddress(addr));
        }
        let config = ServerConfig {
            http_port: self.http_port,
            bind_host: self.bind_host,
            public_host: self.public_host.unwrap_or_else(local_hostname),
        };
        // Reject a bad address now rather than when serving starts
        config.socket_addr()?;

        let router = apply_middleware(self.router.unwrap_or_default(), self.middleware_config);
        Ok(HttpServer { config, router })
    }
}

impl Default for HttpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_parsing() {
        let server = HttpServer::builder()
            .bind("127.0.0.1:9090")
            .public_host("relay.local")
            .build()
            .unwrap();
        assert_eq!(server.config().bind_host, "127.0.0.1");
        assert_eq!(server.config().http_port, 9090);

        let server = HttpServer::builder().bind("7000").build().unwrap();
        assert_eq!(server.config().bind_host, "0.0.0.0");
        assert_eq!(server.config().http_port, 7000);
    }

    #[test]
    fn test_invalid_host_rejected() {
        let err = HttpServer::builder()
            .bind("not a host:80")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::InvalidAddress(_)));

        for addr in ["0.0.0.0:notaport", "localhost", "127.0.0.1:70000"] {
            let err = HttpServer::builder().bind(addr).build().err().unwrap();
            assert!(
                matches!(err, ServerError::InvalidAddress(ref a) if a == addr),
                "{}",
                addr
            );
        }
    }

    #[tokio::test]
    async fn test_graceful_shutdown() {
        let server = HttpServer::builder().bind("127.0.0.1:0").build().unwrap();
        server.serve_with_shutdown(async {}).await.unwrap();
    }
}
