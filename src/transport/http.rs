//! HTTP transport: REST routes plus MCP over Streamable HTTP.
//!
//! Both surfaces share one axum router and one listener. The MCP service is
//! mounted at the configured endpoint; CORS applies to every route.

use crate::config::ProbeSettings;
use crate::error::{DbError, DbResult};
use crate::mcp::ProbeService;
use crate::tools::probe::ProbeToolHandler;
use crate::transport::cors::{CorsConfig, cors_middleware};
use crate::transport::{Transport, rest, wait_for_signal};
use axum::Router;
use axum::middleware;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Graceful shutdown: SSE connections may keep the server alive indefinitely,
/// so the process exits after this long once a shutdown signal arrives.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    settings: ProbeSettings,
    cors: CorsConfig,
    host: String,
    port: u16,
    /// MCP endpoint path
    endpoint: String,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// # Arguments
    ///
    /// * `settings` - Per-request limits for diagnostics, queries and schema reads
    /// * `cors` - Origins allowed to call the REST routes from a browser
    /// * `host` - Host address to bind to
    /// * `port` - Port to bind to
    /// * `endpoint` - MCP endpoint path (e.g., "/mcp")
    pub fn new(
        settings: ProbeSettings,
        cors: CorsConfig,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            cors,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the MCP endpoint path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the combined REST + MCP router.
    pub fn router(&self) -> Router {
        let settings = self.settings;
        let service = StreamableHttpService::new(
            move || Ok(ProbeService::new(settings)),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service doesn't support the root path, use fallback_service instead
        let mcp = if self.endpoint == "/" {
            Router::new().fallback_service(service)
        } else {
            Router::new().nest_service(&self.endpoint, service)
        };

        rest::router(ProbeToolHandler::new(settings))
            .merge(mcp)
            .layer(middleware::from_fn_with_state(
                Arc::new(self.cors.clone()),
                cors_middleware,
            ))
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting HTTP server on {}", bind_addr);

        let app = self.router();

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connectivity(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(
            endpoint = %self.endpoint,
            allowed_origins = self.cors.origin_count(),
            "REST API and MCP endpoint ready"
        );

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
