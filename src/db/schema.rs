//! Schema introspection.
//!
//! Lists every container the target exposes and describes each one through
//! the backend adapter, producing a [`SchemaDescriptor`]. Runs on demand only;
//! for MongoDB the cost grows with databases × collections × sample size.

use crate::config::ProbeSettings;
use crate::db::backend::{BackendAdapter, BackendConnection, ConnectScope};
use crate::db::catch_panic;
use crate::error::DbResult;
use crate::models::{ConnectionSpec, SchemaDescriptor, TableSchema};
use tracing::{debug, info, warn};

/// Schema inspector for database introspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaInspector {
    settings: ProbeSettings,
}

impl SchemaInspector {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    /// Describe every table (or collection) of the target.
    pub async fn get_schema(&self, spec: &ConnectionSpec) -> DbResult<SchemaDescriptor> {
        let result = catch_panic(self.inspect(spec), Err).await;
        if let Err(ref e) = result {
            warn!(backend = %spec.kind(), error = %e, "Schema introspection failed");
        }
        result
    }

    async fn inspect(&self, spec: &ConnectionSpec) -> DbResult<SchemaDescriptor> {
        spec.validate()?;

        let mut conn = BackendConnection::open(spec, self.settings, ConnectScope::Database).await?;
        let tables = catch_panic(describe_all(&mut conn), Err).await;
        conn.release().await;

        let tables = tables?;
        info!(backend = %spec.kind(), containers = tables.len(), "Schema loaded");
        Ok(SchemaDescriptor::new(spec.kind(), tables))
    }
}

async fn describe_all(conn: &mut BackendConnection) -> DbResult<Vec<TableSchema>> {
    let names = conn.list_containers().await?;
    debug!(count = names.len(), "Describing containers");

    let mut tables = Vec::with_capacity(names.len());
    for name in &names {
        tables.push(conn.describe_container(name).await?);
    }
    Ok(tables)
}
