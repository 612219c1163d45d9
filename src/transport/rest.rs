//! REST routes for browser front ends.
//!
//! Per-request failures are returned as `success: false` bodies with HTTP 200;
//! only malformed JSON is rejected by the extractor.

use crate::error::{DbError, ErrorKind};
use crate::models::{BackendKind, ConnectionRequest, ConnectionResult};
use crate::tools::probe::{ExecuteQueryInput, ProbeToolHandler, QueryOutput};
use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

const SERVICE_NAME: &str = "Database LLM Connection Service";

/// Failure body for routes without a result type of their own.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub error_kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&DbError> for ErrorBody {
    fn from(err: &DbError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            error_kind: err.kind(),
            suggestion: err.suggestion().map(str::to_string),
        }
    }
}

/// Build the REST router.
pub fn router(handler: ProbeToolHandler) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/test-connection/mysql", post(test_mysql))
        .route("/api/test-connection/postgresql", post(test_postgres))
        .route("/api/test-connection/mongodb", post(test_mongo))
        .route("/api/execute-query", post(execute_query))
        .route("/api/schema", post(schema))
        .with_state(handler)
}

pub async fn root() -> Json<JsonValue> {
    Json(json!({ "message": SERVICE_NAME, "status": "running" }))
}

pub async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "healthy" }))
}

pub async fn test_mysql(
    State(handler): State<ProbeToolHandler>,
    Json(request): Json<ConnectionRequest>,
) -> Json<ConnectionResult> {
    Json(handler.test_connection(request, Some(BackendKind::MySql)).await)
}

pub async fn test_postgres(
    State(handler): State<ProbeToolHandler>,
    Json(request): Json<ConnectionRequest>,
) -> Json<ConnectionResult> {
    Json(handler.test_connection(request, Some(BackendKind::Postgres)).await)
}

pub async fn test_mongo(
    State(handler): State<ProbeToolHandler>,
    Json(request): Json<ConnectionRequest>,
) -> Json<ConnectionResult> {
    Json(handler.test_connection(request, Some(BackendKind::Mongo)).await)
}

pub async fn execute_query(
    State(handler): State<ProbeToolHandler>,
    Json(input): Json<ExecuteQueryInput>,
) -> Json<QueryOutput> {
    Json(handler.execute_query(input).await)
}

pub async fn schema(
    State(handler): State<ProbeToolHandler>,
    Json(request): Json<ConnectionRequest>,
) -> Response {
    match handler.get_schema(request).await {
        Ok(descriptor) => Json(descriptor).into_response(),
        Err(e) => Json(ErrorBody::from(&e)).into_response(),
    }
}
