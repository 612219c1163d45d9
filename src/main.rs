//! DB Probe Server - Main entry point.
//!
//! Serves connection diagnostics, read-only queries and schema introspection
//! for MySQL, PostgreSQL and MongoDB over MCP (stdio or HTTP) and REST.

use db_probe_server::config::{Config, TransportMode};
use db_probe_server::transport::{CorsConfig, HttpTransport, StdioTransport, Transport};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Output goes to stderr; stdout belongs to the stdio MCP transport.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    info!(
        transport = %config.transport,
        mongo = cfg!(feature = "mongo"),
        "Starting DB Probe Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let settings = config.probe_settings();

    let result = match config.transport {
        TransportMode::Stdio => {
            let transport = StdioTransport::new(settings);
            info!(transport = transport.name(), "Using stdio transport");
            transport.run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            let transport = HttpTransport::new(
                settings,
                CorsConfig::from_origins(&config.allowed_origins),
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            );
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
