//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Backend adapters (MySQL, PostgreSQL, MongoDB) behind one trait
//! - Connection diagnostics
//! - Read-only query execution
//! - Schema introspection
//! - Row normalization
//! - Connection string repair for MongoDB

#[macro_use]
pub mod macros;
pub mod backend;
pub mod diagnostics;
pub mod executor;
#[cfg(feature = "mongo")]
pub mod mongo;
pub mod mysql;
pub mod postgres;
pub mod schema;
pub mod types;
pub mod uri;

pub use backend::{BackendAdapter, BackendConnection, ConnectScope, QueryRows};
pub use diagnostics::ConnectionDiagnostics;
pub use executor::QueryExecutor;
pub use schema::SchemaInspector;
pub use uri::{inject_credentials, repair_escaping};

use crate::error::DbError;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Await `fut`, turning a panic into an internal error handed to `on_panic`.
pub(crate) async fn catch_panic<T, F>(fut: F, on_panic: impl FnOnce(DbError) -> T) -> T
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => value,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(panic = %detail, "Request handler panicked");
            on_panic(DbError::internal(detail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catch_panic_passes_value_through() {
        let value = catch_panic(async { 3 }, |_| 0).await;
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_catch_panic_reports_internal() {
        let result: Result<(), DbError> =
            catch_panic(async { panic!("boom") }, Err).await;
        match result {
            Err(DbError::Internal { message }) => assert_eq!(message, "boom"),
            other => panic!("expected internal error, got {:?}", other),
        }
    }
}
