//! Read-only query execution.
//!
//! Every call validates the text, runs the write-statement guard, opens one
//! connection to the target database, runs the query and closes the
//! connection again. Failures come back as a [`QueryResult`] with
//! `success = false`; this module never returns an error to its caller.

use crate::config::ProbeSettings;
use crate::db::backend::{BackendAdapter, BackendConnection, ConnectScope, QueryRows};
use crate::db::catch_panic;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionSpec, QueryResult};
use crate::tools::guard::enforce_read_only;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Query executor that handles read-only query execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor {
    settings: ProbeSettings,
}

impl QueryExecutor {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    /// Execute query text against the target described by `spec`.
    ///
    /// Execution time is measured from entry, so it includes validation and
    /// connection setup.
    pub async fn execute_query(&self, spec: &ConnectionSpec, text: &str) -> QueryResult {
        let start = Instant::now();
        let elapsed_ms = || start.elapsed().as_millis() as u64;

        let outcome = catch_panic(self.run(spec, text), Err).await;

        match outcome {
            Ok(rows) => {
                let result = QueryResult::ok(rows.columns, rows.rows, elapsed_ms())
                    .with_truncated(rows.truncated);
                info!(
                    backend = %spec.kind(),
                    row_count = result.row_count,
                    execution_time_ms = result.execution_time,
                    truncated = result.truncated,
                    "Query executed"
                );
                result
            }
            Err(e) => {
                warn!(backend = %spec.kind(), error = %e, kind = %e.kind(), "Query failed");
                QueryResult::failed(&e, elapsed_ms())
            }
        }
    }

    async fn run(&self, spec: &ConnectionSpec, text: &str) -> DbResult<QueryRows> {
        if text.trim().is_empty() {
            return Err(DbError::validation("Query must not be empty"));
        }
        enforce_read_only(text)?;
        spec.validate()?;

        debug!(backend = %spec.kind(), target = %spec.target(), "Executing query");

        let mut conn = BackendConnection::open(spec, self.settings, ConnectScope::Database).await?;
        let rows = catch_panic(conn.run_query(text.trim()), Err).await;
        conn.release().await;
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{BackendKind, ConnectionRequest};

    fn unreachable_spec() -> ConnectionSpec {
        ConnectionRequest {
            host: Some("127.0.0.1".into()),
            port: Some(1),
            database: Some("shop".into()),
            user: Some("probe".into()),
            password: Some("secret".into()),
            ..Default::default()
        }
        .into_spec(BackendKind::MySql)
    }

    #[tokio::test]
    async fn test_blocked_query_never_connects() {
        // The target is unreachable, so a connectivity error would mean a driver call happened
        let result = QueryExecutor::default()
            .execute_query(&unreachable_spec(), "DROP TABLE x")
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::QueryPolicy));
        assert!(result.rows.is_empty());
        assert_eq!(result.row_count, 0);
    }

    #[tokio::test]
    async fn test_empty_query_is_validation_error() {
        let result = QueryExecutor::default()
            .execute_query(&unreachable_spec(), "   \n ")
            .await;
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected_before_connect() {
        let spec = ConnectionRequest::default().into_spec(BackendKind::Postgres);
        let result = QueryExecutor::default().execute_query(&spec, "SELECT 1").await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Missing required credentials"));
    }

    #[tokio::test]
    async fn test_unreachable_target_reports_connectivity() {
        let result = QueryExecutor::default()
            .execute_query(&unreachable_spec(), "SELECT 1 AS test")
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Connectivity));
    }
}
