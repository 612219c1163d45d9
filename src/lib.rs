//! DB Probe Server Library
//!
//! Connection diagnostics, guarded read-only queries and schema introspection
//! for MySQL, PostgreSQL and MongoDB, served as MCP tools (stdio or
//! Streamable HTTP) and as a small REST API.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::{Config, ProbeSettings};
pub use error::{DbError, DbResult, ErrorKind};
pub use mcp::ProbeService;
