//! MCP service implementation using rmcp.
//!
//! Exposes connection diagnostics, read-only queries and schema introspection
//! as MCP tools. Every tool takes the connection fields inline; nothing is
//! kept between calls.

use crate::config::ProbeSettings;
use crate::models::{ConnectionRequest, ConnectionResult, SchemaDescriptor};
use crate::tools::probe::{ExecuteQueryInput, ProbeToolHandler, QueryOutput};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

#[derive(Clone)]
pub struct ProbeService {
    handler: ProbeToolHandler,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl ProbeService {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            handler: ProbeToolHandler::new(settings),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl ProbeService {
    #[tool(
        description = "Test a database connection step by step.\nChecks credential format, connectivity, authentication, database access and SELECT privileges (or collection listing for MongoDB).\nReturns every step with its status; the first failing step ends the run.\nSet db_type to mysql, postgresql or mongodb (inferred from port/connection_string when omitted)."
    )]
    async fn test_connection(
        &self,
        Parameters(request): Parameters<ConnectionRequest>,
    ) -> Json<ConnectionResult> {
        Json(self.handler.test_connection(request, None).await)
    }

    #[tool(
        description = "Execute a read-only query and return results.\nSQL for MySQL/PostgreSQL; for MongoDB a JSON document like {\"collection\": \"users\", \"query\": {}, \"limit\": 10} or {\"collection\": \"db.users\", \"aggregate\": [...]}.\nStatements starting with DROP, DELETE, TRUNCATE, ALTER, CREATE, INSERT or UPDATE are blocked.\nOutput format: json (default), table, or markdown."
    )]
    async fn execute_query(
        &self,
        Parameters(input): Parameters<ExecuteQueryInput>,
    ) -> Json<QueryOutput> {
        Json(self.handler.execute_query(input).await)
    }

    #[tool(
        description = "Get the schema of a database: every table with its columns (type, nullability, default, key/extra flags) plus query keywords for autocomplete.\nFor MongoDB, collections of all non-system databases are listed as `database.collection` with field types inferred from sampled documents."
    )]
    async fn get_schema(
        &self,
        Parameters(request): Parameters<ConnectionRequest>,
    ) -> Result<Json<SchemaDescriptor>, McpError> {
        self.handler
            .get_schema(request)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for ProbeService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "db-probe-server".to_owned(),
                title: Some("DB Probe Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Connection diagnostics and read-only access for MySQL, PostgreSQL and MongoDB.\n\
                \n\
                ## Workflow\n\
                1. Call `test_connection` with the connection fields to see which step fails, if any\n\
                2. Call `get_schema` to list tables (or collections) and their columns\n\
                3. Call `execute_query` to run read-only queries\n\
                \n\
                ## Connection fields\n\
                - MySQL/PostgreSQL: `host`, `port`, `database`, `user`, `password`\n\
                - MongoDB: `connection_string`, `database`, optional `username`/`password` overriding the ones in the string\n\
                - `db_type`: mysql, postgresql or mongodb. When omitted, port 3306 means MySQL, 5432 PostgreSQL, and a connection string MongoDB\n\
                \n\
                ## Notes\n\
                - Query failures are returned as results with `success: false`, not as tool errors\n\
                - MongoDB queries return at most 1000 documents unless `limit` is given"
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_info() {
        let service = ProbeService::new(ProbeSettings::default());
        let info = service.get_info();
        assert_eq!(info.server_info.name, "db-probe-server");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_tools_registered() {
        let service = ProbeService::new(ProbeSettings::default());
        let names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();

        for expected in ["test_connection", "execute_query", "get_schema"] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
    }
}
