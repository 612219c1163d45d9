//! Request handlers shared by the MCP tools and the REST routes.
//!
//! Each handler turns a loosely-typed request into a [`ConnectionSpec`] and
//! runs one core operation. Requests that cannot be resolved (unknown backend
//! tag) are answered with a failed result rather than an error.

use crate::config::ProbeSettings;
use crate::db::diagnostics::rejected;
use crate::db::{ConnectionDiagnostics, QueryExecutor, SchemaInspector};
use crate::error::DbResult;
use crate::models::{
    BackendKind, ConnectionRequest, ConnectionResult, QueryResult, SchemaDescriptor,
};
use crate::tools::format::{OutputFormat, format_as_markdown, format_as_table};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input for query execution: the query text plus connection fields.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteQueryInput {
    /// SQL SELECT statement, or a MongoDB JSON query such as
    /// `{"collection": "users", "query": {"active": true}, "limit": 10}`.
    /// Statements starting with DROP/DELETE/TRUNCATE/ALTER/CREATE/INSERT/UPDATE are blocked.
    pub query: String,
    /// Output format: "json" returns structured rows, "table" an ASCII table, "markdown" a markdown table
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(flatten)]
    pub connection: ConnectionRequest,
}

/// Query result plus an optional pre-rendered table.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryOutput {
    #[serde(flatten)]
    pub result: QueryResult,
    /// Pre-formatted output when format is table or markdown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

impl QueryOutput {
    /// Render the result. Formatted output replaces the structured rows.
    pub fn from_result(mut result: QueryResult, format: OutputFormat) -> Self {
        let formatted = match format {
            OutputFormat::Json => None,
            _ if !result.success => None,
            OutputFormat::Table => Some(format_as_table(
                &result.columns,
                &result.rows,
                result.execution_time,
            )),
            OutputFormat::Markdown => Some(format_as_markdown(&result.columns, &result.rows)),
        };
        if formatted.is_some() {
            result.rows.clear();
        }
        Self { result, formatted }
    }
}

/// Handler for diagnostics, query and schema requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeToolHandler {
    diagnostics: ConnectionDiagnostics,
    executor: QueryExecutor,
    inspector: SchemaInspector,
}

impl ProbeToolHandler {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            diagnostics: ConnectionDiagnostics::new(settings),
            executor: QueryExecutor::new(settings),
            inspector: SchemaInspector::new(settings),
        }
    }

    /// Run diagnostics. `kind` pins the backend (REST routes are per backend);
    /// otherwise it comes from `db_type` or is inferred.
    pub async fn test_connection(
        &self,
        request: ConnectionRequest,
        kind: Option<BackendKind>,
    ) -> ConnectionResult {
        let kind = match kind.map_or_else(|| request.backend_kind(), Ok) {
            Ok(kind) => kind,
            Err(e) => return rejected(&e, "Unsupported database type"),
        };
        let spec = request.into_spec(kind);
        info!(backend = %kind, target = %spec.target(), "Testing connection");
        self.diagnostics.test_connection(&spec).await
    }

    pub async fn execute_query(&self, input: ExecuteQueryInput) -> QueryOutput {
        let result = match input.connection.resolve() {
            Ok(spec) => self.executor.execute_query(&spec, &input.query).await,
            Err(e) => QueryResult::failed(&e, 0),
        };
        QueryOutput::from_result(result, input.format)
    }

    pub async fn get_schema(&self, request: ConnectionRequest) -> DbResult<SchemaDescriptor> {
        let spec = request.resolve()?;
        self.inspector.get_schema(&spec).await
    }
}
