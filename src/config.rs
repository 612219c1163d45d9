//! Configuration handling for the DB Probe Server.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use clap::{Parser, ValueEnum};
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_MCP_ENDPOINT: &str = "/mcp";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_SELECTION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DOCUMENT_ROW_LIMIT: i64 = 1000;
pub const DEFAULT_SCHEMA_SAMPLE_SIZE: i64 = 100;
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["http://localhost:5173", "http://localhost:3000"];

/// Transport mode for the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (MCP only)
    #[default]
    Stdio,
    /// HTTP: REST API plus MCP Streamable HTTP
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Per-request limits handed to the diagnostics, query and schema layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub connect_timeout: Duration,
    /// Applies to each relational read/write round trip and Mongo command.
    pub query_timeout: Duration,
    pub server_selection_timeout: Duration,
    /// Default `limit` for document queries without one.
    pub document_row_limit: i64,
    /// Documents sampled per collection during schema inference.
    pub schema_sample_size: i64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            server_selection_timeout: Duration::from_secs(DEFAULT_SERVER_SELECTION_TIMEOUT_SECS),
            document_row_limit: DEFAULT_DOCUMENT_ROW_LIMIT,
            schema_sample_size: DEFAULT_SCHEMA_SAMPLE_SIZE,
        }
    }
}

/// Configuration for the DB Probe Server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-probe-server",
    about = "Connection diagnostics, read-only queries and schema introspection for MySQL, PostgreSQL and MongoDB",
    version,
    author
)]
pub struct Config {
    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "PROBE_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "PROBE_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "PROBE_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "PROBE_MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "PROBE_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Read/write timeout in seconds for each database round trip
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "PROBE_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// MongoDB server selection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_SERVER_SELECTION_TIMEOUT_SECS,
        env = "PROBE_SERVER_SELECTION_TIMEOUT"
    )]
    pub server_selection_timeout: u64,

    /// Default row limit for MongoDB queries that don't set one
    #[arg(
        long,
        default_value_t = DEFAULT_DOCUMENT_ROW_LIMIT,
        env = "PROBE_DOCUMENT_ROW_LIMIT"
    )]
    pub document_row_limit: i64,

    /// Documents sampled per collection when inferring MongoDB schemas
    #[arg(
        long,
        default_value_t = DEFAULT_SCHEMA_SAMPLE_SIZE,
        env = "PROBE_SCHEMA_SAMPLE_SIZE"
    )]
    pub schema_sample_size: i64,

    /// Origins allowed by CORS on the HTTP transport.
    /// Can be specified multiple times or as comma-separated values.
    #[arg(
        long = "allowed-origin",
        value_name = "ORIGIN",
        env = "PROBE_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values_t = DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect::<Vec<_>>()
    )]
    pub allowed_origins: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PROBE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "PROBE_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            server_selection_timeout: DEFAULT_SERVER_SELECTION_TIMEOUT_SECS,
            document_row_limit: DEFAULT_DOCUMENT_ROW_LIMIT,
            schema_sample_size: DEFAULT_SCHEMA_SAMPLE_SIZE,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Build the per-request limits from the parsed options.
    ///
    /// Zero or negative row limits fall back to the defaults.
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            query_timeout: Duration::from_secs(self.query_timeout),
            server_selection_timeout: Duration::from_secs(self.server_selection_timeout),
            document_row_limit: positive_or(self.document_row_limit, DEFAULT_DOCUMENT_ROW_LIMIT),
            schema_sample_size: positive_or(self.schema_sample_size, DEFAULT_SCHEMA_SAMPLE_SIZE),
        }
    }
}

fn positive_or(value: i64, default: i64) -> i64 {
    if value > 0 { value } else { default }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.http_host, DEFAULT_HTTP_HOST);
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.mcp_endpoint, "/mcp");
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:5173", "http://localhost:3000"]
        );
    }

    #[test]
    fn test_http_bind_addr() {
        let config = Config {
            http_host: "0.0.0.0".to_string(),
            http_port: 3000,
            ..Config::default()
        };
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_probe_settings_durations() {
        let config = Config {
            query_timeout: 60,
            connect_timeout: 15,
            server_selection_timeout: 5,
            ..Config::default()
        };
        let settings = config.probe_settings();
        assert_eq!(settings.query_timeout, Duration::from_secs(60));
        assert_eq!(settings.connect_timeout, Duration::from_secs(15));
        assert_eq!(settings.server_selection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_probe_settings_default_matches_config_default() {
        assert_eq!(Config::default().probe_settings(), ProbeSettings::default());
    }

    #[test]
    fn test_non_positive_limits_fall_back() {
        let config = Config {
            document_row_limit: 0,
            schema_sample_size: -3,
            ..Config::default()
        };
        let settings = config.probe_settings();
        assert_eq!(settings.document_row_limit, DEFAULT_DOCUMENT_ROW_LIMIT);
        assert_eq!(settings.schema_sample_size, DEFAULT_SCHEMA_SAMPLE_SIZE);
    }

    #[test]
    fn test_parse_comma_separated_origins() {
        let config = Config::try_parse_from([
            "db-probe-server",
            "--allowed-origin",
            "http://a.test,http://b.test",
        ])
        .unwrap();
        assert_eq!(config.allowed_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_parse_http_transport() {
        let config =
            Config::try_parse_from(["db-probe-server", "--transport", "http", "--http-port", "9000"])
                .unwrap();
        assert_eq!(config.transport, TransportMode::Http);
        assert_eq!(config.http_port, 9000);
    }
}
