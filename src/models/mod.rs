//! Data models for the DB Probe Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod diagnostics;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{
    BackendKind, ConnectionRequest, ConnectionSpec, DocumentSpec, RelationalSpec,
    mask_connection_string,
};
pub use diagnostics::{ConnectionResult, DiagnosticStep, MAX_STEPS, StepStatus, StepTrace};
pub use query::{DocumentQuery, MAX_ROW_LIMIT, QueryResult};
pub use schema::{ColumnDefinition, SchemaDescriptor, TableSchema, keywords_for};
