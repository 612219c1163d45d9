//! MySQL adapter.

use crate::config::ProbeSettings;
use crate::db::backend::{
    BackendAdapter, ConnectScope, QueryRows, read_check_error, with_timeout,
};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, ColumnDefinition, MAX_ROW_LIMIT, RelationalSpec, TableSchema};
use futures_util::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Executor, Row};
use tracing::debug;

mod queries {
    pub const PROBE_SELECT: &str = "SELECT 1 AS test";

    pub const LIST_TABLES: &str = r#"
        SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
            CONVERT(EXTRA USING utf8) AS EXTRA
        FROM information_schema.COLUMNS
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
        ORDER BY ORDINAL_POSITION
    "#;
}

/// Quote an identifier with backticks, doubling embedded backticks.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Get a string from a MySQL row.
/// information_schema may hand back VARBINARY depending on server charset.
fn get_string(row: &MySqlRow, column: &str) -> String {
    get_optional_string(row, column).unwrap_or_default()
}

fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(column)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

fn column_from_row(row: &MySqlRow) -> ColumnDefinition {
    let name = get_string(row, "COLUMN_NAME");
    let column_type = get_string(row, "COLUMN_TYPE");
    let nullable = get_string(row, "IS_NULLABLE") == "YES";
    let is_pk = get_string(row, "COLUMN_KEY") == "PRI";

    let mut col = ColumnDefinition::new(name, column_type, nullable).with_primary_key(is_pk);
    if let Some(ref def) = get_optional_string(row, "COLUMN_DEFAULT") {
        col = col.with_default_str(def);
    }
    if let Some(extra) = get_optional_string(row, "EXTRA") {
        col = col.with_extra(extra);
    }
    col
}

pub struct MySqlAdapter {
    conn: MySqlConnection,
    settings: ProbeSettings,
}

impl MySqlAdapter {
    /// Connect to the server. With [`ConnectScope::Server`] no database is
    /// selected until [`BackendAdapter::check_database`] runs.
    pub async fn connect(
        spec: &RelationalSpec,
        settings: ProbeSettings,
        scope: ConnectScope,
    ) -> DbResult<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&spec.host)
            .port(spec.port)
            .username(&spec.user)
            .password(&spec.password)
            .charset("utf8mb4");
        if scope == ConnectScope::Database {
            options = options.database(&spec.database);
        }

        let conn = with_timeout(settings.connect_timeout, "connect", async {
            MySqlConnection::connect_with(&options)
                .await
                .map_err(|e| DbError::from(e).for_database(&spec.database))
        })
        .await?;

        debug!(host = %spec.host, port = spec.port, "MySQL connection established");
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
            // No rows: recover column names from statement metadata
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

impl BackendAdapter for MySqlAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    async fn authenticate(&mut self) -> DbResult<()> {
        with_timeout(self.settings.query_timeout, "ping", async {
            self.conn.ping().await.map_err(DbError::from)
        })
        .await
    }

    async fn check_database(&mut self, database: &str) -> DbResult<Option<usize>> {
        let statement = format!("USE {}", quote_identifier(database));
        with_timeout(self.settings.query_timeout, "select database", async {
            (&mut self.conn)
                .execute(statement.as_str())
                .await
                .map_err(|e| DbError::from(e).for_database(database))
        })
        .await?;
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
        let rows = with_timeout(self.settings.query_timeout, "list tables", async {
            sqlx::query(queries::LIST_TABLES)
                .fetch_all(&mut self.conn)
                .await
                .map_err(DbError::from)
        })
        .await?;

        Ok(rows
            .iter()
            .map(|row| get_string(row, "TABLE_NAME"))
            .filter(|name| !name.is_empty())
            .collect())
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

        Ok(rows
            .iter()
            .map(column_from_row)
            .fold(TableSchema::new(name), TableSchema::with_column))
    }

    async fn close(self) -> DbResult<()> {
        self.conn.close().await.map_err(DbError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("shop"), "`shop`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_catalog_queries_scope_to_current_database() {
        assert!(queries::LIST_TABLES.contains("DATABASE()"));
        assert!(queries::LIST_TABLES.contains("BASE TABLE"));
        assert!(queries::DESCRIBE_COLUMNS.contains("ORDINAL_POSITION"));
    }
}
