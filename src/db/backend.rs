//! Backend adapters.
//!
//! Each request opens exactly one connection through [`BackendConnection::open`],
//! runs its checks or query against it, and closes it with
//! [`BackendConnection::release`]. There is no pooling; every operation owns a
//! fresh connection for its whole lifetime.

use crate::config::ProbeSettings;
use crate::db::mysql::MySqlAdapter;
use crate::db::postgres::PgAdapter;
use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, ConnectionSpec, TableSchema};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(feature = "mongo")]
use crate::db::mongo::MongoAdapter;

/// Whether the connection should select the target database up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectScope {
    /// Diagnostics: MySQL connects to the server and selects the database in a
    /// separate step so access failures are reported on their own.
    Server,
    /// Queries and schema reads run against the target database.
    Database,
}

/// Rows returned by an adapter before timing is attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub truncated: bool,
}

/// Capabilities every backend provides.
///
/// Methods map onto the diagnostics steps and the query/schema operations.
/// Implementations wrap each network call in a timeout.
pub trait BackendAdapter: Send {
    fn kind(&self) -> BackendKind;

    /// Round trip proving the session is authenticated.
    fn authenticate(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    /// Select or verify the target database.
    ///
    /// Returns the number of databases visible on the server when the backend
    /// reports it.
    fn check_database(
        &mut self,
        database: &str,
    ) -> impl Future<Output = DbResult<Option<usize>>> + Send;

    /// Minimal read against the target database. Returns the container count.
    fn probe_read(&mut self) -> impl Future<Output = DbResult<usize>> + Send;

    /// Run query text and normalize the rows.
    fn run_query(&mut self, text: &str) -> impl Future<Output = DbResult<QueryRows>> + Send;

    /// Names of the tables (or `database.collection` pairs) to describe.
    fn list_containers(&mut self) -> impl Future<Output = DbResult<Vec<String>>> + Send;

    fn describe_container(
        &mut self,
        name: &str,
    ) -> impl Future<Output = DbResult<TableSchema>> + Send;

    fn close(self) -> impl Future<Output = DbResult<()>> + Send
    where
        Self: Sized;
}

/// One open connection to any supported backend.
pub enum BackendConnection {
    MySql(MySqlAdapter),
    Postgres(PgAdapter),
    #[cfg(feature = "mongo")]
    Mongo(MongoAdapter),
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackendConnection").field(&self.kind()).finish()
    }
}

impl BackendConnection {
    /// Open a connection for the given spec. The spec must already be validated.
    pub async fn open(
        spec: &ConnectionSpec,
        settings: ProbeSettings,
        scope: ConnectScope,
    ) -> DbResult<Self> {
        debug!(backend = %spec.kind(), target = %spec.target(), ?scope, "Opening connection");

        match spec {
            ConnectionSpec::MySql(relational) => Ok(Self::MySql(
                MySqlAdapter::connect(relational, settings, scope).await?,
            )),
            ConnectionSpec::Postgres(relational) => Ok(Self::Postgres(
                PgAdapter::connect(relational, settings).await?,
            )),
            #[cfg(feature = "mongo")]
            ConnectionSpec::Mongo(document) => {
                Ok(Self::Mongo(MongoAdapter::connect(document, settings).await?))
            }
            #[cfg(not(feature = "mongo"))]
            ConnectionSpec::Mongo(_) => Err(DbError::driver_unavailable("MongoDB")),
        }
    }

    /// Close the connection, logging (not returning) any close failure.
    pub async fn release(self) {
        let kind = self.kind();
        if let Err(e) = self.close().await {
            warn!(backend = %kind, error = %e, "Failed to close connection cleanly");
        } else {
            debug!(backend = %kind, "Connection closed");
        }
    }
}

impl BackendAdapter for BackendConnection {
    fn kind(&self) -> BackendKind {
        dispatch_backend!(self, conn => conn.kind())
    }

    async fn authenticate(&mut self) -> DbResult<()> {
        dispatch_backend!(self, conn => conn.authenticate().await)
    }

    async fn check_database(&mut self, database: &str) -> DbResult<Option<usize>> {
        dispatch_backend!(self, conn => conn.check_database(database).await)
    }

    async fn probe_read(&mut self) -> DbResult<usize> {
        dispatch_backend!(self, conn => conn.probe_read().await)
    }

    async fn run_query(&mut self, text: &str) -> DbResult<QueryRows> {
        dispatch_backend!(self, conn => conn.run_query(text).await)
    }

    async fn list_containers(&mut self) -> DbResult<Vec<String>> {
        dispatch_backend!(self, conn => conn.list_containers().await)
    }

    async fn describe_container(&mut self, name: &str) -> DbResult<TableSchema> {
        dispatch_backend!(self, conn => conn.describe_container(name).await)
    }

    async fn close(self) -> DbResult<()> {
        dispatch_backend!(self, conn => conn.close().await)
    }
}

/// Run a driver future under a time limit.
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout(operation, limit.as_secs())),
    }
}

/// Map a failure inside [`BackendAdapter::probe_read`] onto a privilege error.
///
/// Transport failures and errors already classified as privilege problems
/// pass through unchanged.
pub(crate) fn read_check_error(operation: &str, err: DbError) -> DbError {
    if err.is_transport() || matches!(err, DbError::Privilege { .. }) {
        return err;
    }
    let reason = match err {
        DbError::Query { message, .. } => message,
        other => other.to_string(),
    };
    DbError::privilege(operation, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_check_error_reports_privilege() {
        let err = read_check_error("list", DbError::query("relation does not exist", None));
        match err {
            DbError::Privilege { operation, reason } => {
                assert_eq!(operation, "list");
                assert_eq!(reason, "relation does not exist");
            }
            other => panic!("expected privilege error, got {:?}", other),
        }

        let err = read_check_error("list", DbError::access("shop", "not authorized"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Privilege);
    }

    #[test]
    fn test_read_check_error_keeps_transport_failures() {
        let err = read_check_error("SELECT", DbError::timeout("list tables", 10));
        assert!(matches!(err, DbError::Timeout { .. }));

        let err = read_check_error("SELECT", DbError::connectivity("reset", "retry"));
        assert!(matches!(err, DbError::Connectivity { .. }));

        let err = read_check_error("list", DbError::privilege("SELECT", "denied"));
        assert!(matches!(err, DbError::Privilege { ref operation, .. } if operation == "SELECT"));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Duration::from_secs(1), "noop", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: DbResult<()> = with_timeout(Duration::from_millis(10), "sleep", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(DbError::Timeout { operation, .. }) => assert_eq!(operation, "sleep"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[cfg(feature = "mongo")]
    #[tokio::test]
    async fn test_panicking_body_still_releases_connection() {
        use crate::db::catch_panic;
        use crate::models::ConnectionRequest;

        let spec = ConnectionRequest {
            connection_string: Some("mongodb://127.0.0.1:1/".into()),
            database: Some("shop".into()),
            ..Default::default()
        }
        .into_spec(BackendKind::Mongo);

        // Building the client does not contact the server
        let mut conn =
            BackendConnection::open(&spec, ProbeSettings::default(), ConnectScope::Database)
                .await
                .unwrap();

        let outcome: DbResult<usize> = catch_panic(
            async {
                assert_eq!(conn.kind(), BackendKind::Mongo);
                panic!("adapter bug");
            },
            Err,
        )
        .await;

        assert_eq!(conn.kind(), BackendKind::Mongo);
        let released = with_timeout(Duration::from_secs(5), "release", async {
            conn.release().await;
            Ok(())
        })
        .await;
        assert!(released.is_ok());

        match outcome {
            Err(DbError::Internal { message }) => assert!(message.contains("adapter bug")),
            other => panic!("expected internal error, got {:?}", other),
        }
    }

    #[cfg(not(feature = "mongo"))]
    #[tokio::test]
    async fn test_mongo_without_driver_is_unavailable() {
        use crate::models::ConnectionRequest;

        let spec = ConnectionRequest {
            connection_string: Some("mongodb://localhost".into()),
            ..Default::default()
        }
        .into_spec(BackendKind::Mongo);

        let err = BackendConnection::open(&spec, ProbeSettings::default(), ConnectScope::Database)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DriverUnavailable { .. }));
    }
}
