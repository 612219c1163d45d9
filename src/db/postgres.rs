//! PostgreSQL adapter.

use crate::config::ProbeSettings;
use crate::db::backend::{BackendAdapter, QueryRows, read_check_error, with_timeout};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, ColumnDefinition, MAX_ROW_LIMIT, RelationalSpec, TableSchema};
use futures_util::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Executor, Row};
use tracing::debug;

const APPLICATION_NAME: &str = "db-probe-server";

mod queries {
    pub const CURRENT_DATABASE: &str = "SELECT current_database()::text";

    pub const PROBE_SELECT: &str = "SELECT 1 AS test";

    pub const LIST_TABLES: &str = r#"
        SELECT table_name::text AS table_name
        FROM information_schema.tables
        WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
        ORDER BY table_name
    "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_name::text AS column_name,
            format_type(a.atttypid, a.atttypmod) AS column_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            EXISTS (
                SELECT 1
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                WHERE tc.table_name = c.table_name
                    AND tc.table_schema = c.table_schema
                    AND tc.constraint_type = 'PRIMARY KEY'
                    AND kcu.column_name = c.column_name
            ) AS is_primary_key,
            CASE WHEN c.is_identity = 'YES' THEN 'identity' ELSE '' END AS extra
        FROM information_schema.columns c
        JOIN pg_namespace n ON n.nspname = c.table_schema
        JOIN pg_class t ON t.relname = c.table_name AND t.relnamespace = n.oid
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
        WHERE c.table_name = $1 AND c.table_schema = 'public'
        ORDER BY c.ordinal_position
    "#;
}

fn column_from_row(row: &PgRow) -> DbResult<ColumnDefinition> {
    let name: String = row.try_get("column_name")?;
    let column_type: String = row.try_get("column_type")?;
    let nullable: String = row.try_get("is_nullable")?;
    let default_value: Option<String> = row.try_get("column_default").ok().flatten();
    let is_pk: bool = row.try_get("is_primary_key").unwrap_or(false);
    let extra: Option<String> = row.try_get("extra").ok().flatten();

    let mut col = ColumnDefinition::new(name, column_type, nullable == "YES").with_primary_key(is_pk);
    if let Some(ref def) = default_value {
        col = col.with_default_str(def);
    }
    if let Some(extra) = extra {
        col = col.with_extra(extra);
    }
    Ok(col)
}

pub struct PgAdapter {
    conn: PgConnection,
    settings: ProbeSettings,
}

impl PgAdapter {
    /// Connect directly to the target database. PostgreSQL sessions are bound
    /// to one database, so there is no server-only scope.
    pub async fn connect(spec: &RelationalSpec, settings: ProbeSettings) -> DbResult<Self> {
        let options = PgConnectOptions::new()
            .host(&spec.host)
            .port(spec.port)
            .username(&spec.user)
            .password(&spec.password)
            .database(&spec.database)
            .application_name(APPLICATION_NAME);

        let conn = with_timeout(settings.connect_timeout, "connect", async {
            PgConnection::connect_with(&options)
                .await
                .map_err(|e| DbError::from(e).for_database(&spec.database))
        })
        .await?;

        debug!(host = %spec.host, port = spec.port, "PostgreSQL connection established");
        Ok(Self { conn, settings })
    }

    async fn fetch_rows(&mut self, text: &str) -> DbResult<QueryRows> {
        let mut result = QueryRows::default();
        {
            let mut stream = (&mut self.conn).fetch(text);
            while let Some(row) = stream.try_next().await? {
                if result.rows.len() == MAX_ROW_LIMIT {
                    result.truncated = true;
                    break;
                }
                if result.columns.is_empty() {
                    result.columns = row.column_names();
                }
                result.rows.push(row.to_json_map());
            }
        }

        if result.columns.is_empty() {
            if let Ok(described) = (&mut self.conn).describe(text).await {
                result.columns = described
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();
            }
        }
        Ok(result)
    }
}

impl BackendAdapter for PgAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn authenticate(&mut self) -> DbResult<()> {
        with_timeout(self.settings.query_timeout, "ping", async {
            self.conn.ping().await.map_err(DbError::from)
        })
        .await
    }

    async fn check_database(&mut self, database: &str) -> DbResult<Option<usize>> {
        let current: String = with_timeout(self.settings.query_timeout, "current database", async {
            sqlx::query_scalar(queries::CURRENT_DATABASE)
                .fetch_one(&mut self.conn)
                .await
                .map_err(DbError::from)
        })
        .await?;

        if current != database {
            return Err(DbError::access(
                database,
                format!("session is attached to '{}'", current),
            ));
        }
        Ok(None)
    }

    async fn probe_read(&mut self) -> DbResult<usize> {
        let timeout = self.settings.query_timeout;
        with_timeout(timeout, "select probe", async {
            sqlx::query(queries::PROBE_SELECT)
                .fetch_one(&mut self.conn)
                .await
                .map_err(|e| read_check_error("SELECT", DbError::from(e)))
        })
        .await?;
        let tables = self
            .list_containers()
            .await
            .map_err(|e| read_check_error("list tables", e))?;
        Ok(tables.len())
    }

    async fn run_query(&mut self, text: &str) -> DbResult<QueryRows> {
        let timeout = self.settings.query_timeout;
        with_timeout(timeout, "query", self.fetch_rows(text)).await
    }

    async fn list_containers(&mut self) -> DbResult<Vec<String>> {
        let names: Vec<String> = with_timeout(self.settings.query_timeout, "list tables", async {
            sqlx::query_scalar(queries::LIST_TABLES)
                .fetch_all(&mut self.conn)
                .await
                .map_err(DbError::from)
        })
        .await?;
        Ok(names)
    }

    async fn describe_container(&mut self, name: &str) -> DbResult<TableSchema> {
        let rows = with_timeout(self.settings.query_timeout, "describe table", async {
            sqlx::query(queries::DESCRIBE_COLUMNS)
                .bind(name)
                .fetch_all(&mut self.conn)
                .await
                .map_err(DbError::from)
        })
        .await?;

        rows.iter()
            .map(column_from_row)
            .try_fold(TableSchema::new(name), |table, column| {
                Ok(table.with_column(column?))
            })
    }

    async fn close(self) -> DbResult<()> {
        self.conn.close().await.map_err(DbError::from)
    }
}
