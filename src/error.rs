//! Error types for the DB Probe Server.
//!
//! This module defines the failure taxonomy shared by connection diagnostics,
//! query execution and schema introspection. Every driver error is classified
//! into one of these variants at the point where it occurs, so callers only
//! ever see values, never driver-specific error types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serializable failure category, exposed to clients next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    DriverUnavailable,
    Connectivity,
    Timeout,
    Authentication,
    Access,
    Privilege,
    QueryPolicy,
    Query,
    UnsupportedBackend,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::DriverUnavailable => "driver_unavailable",
            Self::Connectivity => "connectivity",
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::Access => "access",
            Self::Privilege => "privilege",
            Self::QueryPolicy => "query_policy",
            Self::Query => "query",
            Self::UnsupportedBackend => "unsupported_backend",
            Self::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("{message}")]
    Validation { message: String },

    #[error("{driver} driver is not available in this build")]
    DriverUnavailable { driver: String },

    #[error("Connection failed: {message}")]
    Connectivity { message: String, suggestion: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    /// Never carries driver internals (e.g. auth plugin negotiation details).
    #[error("Authentication failed")]
    Authentication { suggestion: String },

    #[error("Cannot access database '{database}': {reason}")]
    Access { database: String, reason: String },

    #[error("Permission denied: {operation} - {reason}")]
    Privilege { operation: String, reason: String },

    #[error("Query blocked: '{keyword}' statements are not allowed. Only read queries can be executed.")]
    QueryPolicy { keyword: String },

    #[error("Query error: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Unsupported database type: {backend}")]
    UnsupportedBackend { backend: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a driver unavailable error.
    pub fn driver_unavailable(driver: impl Into<String>) -> Self {
        Self::DriverUnavailable {
            driver: driver.into(),
        }
    }

    /// Create a connectivity error with a helpful suggestion.
    pub fn connectivity(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an authentication error.
    pub fn authentication(suggestion: impl Into<String>) -> Self {
        Self::Authentication {
            suggestion: suggestion.into(),
        }
    }

    /// Create an access error for a database or collection.
    pub fn access(database: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Access {
            database: database.into(),
            reason: reason.into(),
        }
    }

    /// Create a privilege error.
    pub fn privilege(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Privilege {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a query policy error for a blocked keyword.
    pub fn query_policy(keyword: impl Into<String>) -> Self {
        Self::QueryPolicy {
            keyword: keyword.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    /// Create an unsupported backend error.
    pub fn unsupported_backend(backend: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            backend: backend.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::DriverUnavailable { .. } => ErrorKind::DriverUnavailable,
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Access { .. } => ErrorKind::Access,
            Self::Privilege { .. } => ErrorKind::Privilege,
            Self::QueryPolicy { .. } => ErrorKind::QueryPolicy,
            Self::Query { .. } => ErrorKind::Query,
            Self::UnsupportedBackend { .. } => ErrorKind::UnsupportedBackend,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connectivity { suggestion, .. } => Some(suggestion),
            Self::Authentication { suggestion } => Some(suggestion),
            Self::DriverUnavailable { .. } => {
                Some("Rebuild the server with the matching cargo feature enabled")
            }
            Self::Timeout { .. } => Some("Check that the host is reachable and not firewalled"),
            _ => None,
        }
    }

    /// Fill in the database name on access errors raised without one.
    pub fn for_database(self, name: &str) -> Self {
        match self {
            Self::Access { database, reason } if database.is_empty() => Self::Access {
                database: name.to_string(),
                reason,
            },
            other => other,
        }
    }

    /// Connectivity or timeout failure, as opposed to a server-side refusal.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Timeout { .. })
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

// MySQL server error numbers (see mysqld_error.h).
const ER_DBACCESS_DENIED_ERROR: u16 = 1044;
const ER_ACCESS_DENIED_ERROR: u16 = 1045;
const ER_BAD_DB_ERROR: u16 = 1049;
const ER_TABLEACCESS_DENIED_ERROR: u16 = 1142;
const ER_COLUMNACCESS_DENIED_ERROR: u16 = 1143;
const ER_SPECIFIC_ACCESS_DENIED_ERROR: u16 = 1227;

/// Classify a sqlx error into the shared taxonomy.
///
/// Database errors are classified by MySQL error number where available,
/// otherwise by SQLSTATE, so the same mapping serves both relational drivers.
pub fn classify_sqlx_error(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(db_err) => {
            let sql_state = db_err.code().map(|c| c.to_string());
            let message = db_err.message().to_string();

            if let Some(mysql_err) = db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
            {
                return match mysql_err.number() {
                    ER_ACCESS_DENIED_ERROR => {
                        DbError::authentication("Check username/password")
                    }
                    ER_BAD_DB_ERROR => {
                        DbError::access("", "database does not exist")
                    }
                    ER_DBACCESS_DENIED_ERROR => {
                        DbError::access("", "user has no access to this database")
                    }
                    ER_TABLEACCESS_DENIED_ERROR
                    | ER_COLUMNACCESS_DENIED_ERROR
                    | ER_SPECIFIC_ACCESS_DENIED_ERROR => DbError::privilege("query", message),
                    _ => DbError::query(message, sql_state),
                };
            }

            match sql_state.as_deref() {
                Some("28P01") | Some("28000") => {
                    DbError::authentication("Check username/password")
                }
                Some("3D000") => DbError::access("", "database does not exist"),
                Some("42501") => DbError::privilege("query", message),
                Some(code) if code.starts_with("08") => DbError::connectivity(
                    message,
                    "Check network connectivity and database server status",
                ),
                _ => DbError::query(message, sql_state),
            }
        }
        sqlx::Error::Configuration(msg) => DbError::validation(format!(
            "Invalid connection parameters: {}",
            msg
        )),
        sqlx::Error::Io(io_err) => DbError::connectivity(
            format!("I/O error: {}", io_err),
            "Check host/port and network",
        ),
        sqlx::Error::Tls(tls_err) => DbError::connectivity(
            format!("TLS error: {}", tls_err),
            "Verify TLS configuration and certificates",
        ),
        sqlx::Error::Protocol(msg) => {
            // Unsupported auth plugins surface here; report them as a plain
            // authentication failure.
            let lower = msg.to_lowercase();
            if lower.contains("auth") || lower.contains("plugin") || lower.contains("password")
            {
                DbError::authentication("Check username/password and the account's authentication plugin")
            } else {
                DbError::connectivity(
                    format!("Protocol error: {}", msg),
                    "Check database server compatibility",
                )
            }
        }
        sqlx::Error::RowNotFound => DbError::query("No rows returned", None),
        sqlx::Error::ColumnNotFound(col) => {
            DbError::query(format!("Column not found: {}", col), None)
        }
        sqlx::Error::ColumnDecode { index, source } => {
            DbError::internal(format!("Failed to decode column {}: {}", index, source))
        }
        sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
        sqlx::Error::PoolTimedOut => DbError::timeout("connection acquire", 0),
        sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
        _ => DbError::internal(format!("Unknown database error: {}", err)),
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        classify_sqlx_error(err)
    }
}

// MongoDB server error codes.
#[cfg(feature = "mongo")]
const MONGO_UNAUTHORIZED: i32 = 13;
#[cfg(feature = "mongo")]
const MONGO_AUTHENTICATION_FAILED: i32 = 18;

/// Classify a MongoDB driver error into the shared taxonomy.
#[cfg(feature = "mongo")]
pub fn classify_mongo_error(err: mongodb::error::Error) -> DbError {
    use mongodb::error::ErrorKind as MongoErrorKind;

    match err.kind.as_ref() {
        MongoErrorKind::Authentication { .. } => {
            DbError::authentication("Check username/password and authSource")
        }
        MongoErrorKind::ServerSelection { message, .. } => {
            // Auth failures during handshake are sometimes reported as
            // server selection errors.
            if message.contains("Authentication failed") || message.contains("auth error") {
                DbError::authentication("Check username/password and authSource")
            } else {
                DbError::connectivity(
                    message.clone(),
                    "Check the connection string hosts and network access",
                )
            }
        }
        MongoErrorKind::DnsResolve { message, .. } => DbError::connectivity(
            message.clone(),
            "Check the cluster hostname in the connection string",
        ),
        MongoErrorKind::Io(io_err) => DbError::connectivity(
            format!("I/O error: {}", io_err),
            "Check the connection string hosts and network access",
        ),
        MongoErrorKind::InvalidArgument { message, .. } => {
            DbError::validation(format!("Invalid connection string: {}", message))
        }
        MongoErrorKind::Command(command_err) => match command_err.code {
            MONGO_AUTHENTICATION_FAILED => {
                DbError::authentication("Check username/password and authSource")
            }
            MONGO_UNAUTHORIZED => {
                DbError::privilege(command_err.code_name.clone(), command_err.message.clone())
            }
            _ => DbError::query(
                command_err.message.clone(),
                Some(command_err.code.to_string()),
            ),
        },
        _ => DbError::query(err.to_string(), None),
    }
}

#[cfg(feature = "mongo")]
impl From<mongodb::error::Error> for DbError {
    fn from(err: mongodb::error::Error) -> Self {
        classify_mongo_error(err)
    }
}

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the error kind and suggestion in the `data` object.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let mut data = suggestion_data(err.suggestion()).unwrap_or_else(|| serde_json::json!({}));
        data["kind"] = serde_json::json!(err.kind());

        match err.kind() {
            ErrorKind::Validation
            | ErrorKind::QueryPolicy
            | ErrorKind::Query
            | ErrorKind::UnsupportedBackend => {
                let msg = match &err {
                    DbError::Query {
                        message,
                        sql_state: Some(code),
                    } => format!("{} (SQLSTATE: {})", message, code),
                    _ => err.to_string(),
                };
                rmcp::ErrorData::invalid_params(msg, Some(data))
            }
            ErrorKind::Access => rmcp::ErrorData::resource_not_found(err.to_string(), Some(data)),
            ErrorKind::Authentication | ErrorKind::Privilege => {
                rmcp::ErrorData::invalid_request(err.to_string(), Some(data))
            }
            ErrorKind::DriverUnavailable
            | ErrorKind::Connectivity
            | ErrorKind::Timeout
            | ErrorKind::Internal => rmcp::ErrorData::internal_error(err.to_string(), Some(data)),
        }
    }
}
