//! Step-by-step connection diagnostics.
//!
//! A run walks a fixed sequence of checks against one connection and records
//! each as a [`DiagnosticStep`](crate::models::DiagnosticStep). The first
//! failure halts the run; the result always carries the full trace.

use crate::config::ProbeSettings;
use crate::db::backend::{BackendAdapter, BackendConnection, ConnectScope};
use crate::db::catch_panic;
use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, ConnectionResult, ConnectionSpec, StepTrace};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

pub const STEP_VALIDATE: &str = "Validating credentials format";
pub const STEP_CONNECT: &str = "Establishing connection";
pub const STEP_AUTHENTICATE: &str = "Authenticating user";
pub const STEP_DATABASE: &str = "Checking database access";
pub const STEP_SELECT: &str = "Testing SELECT privileges";
pub const STEP_COLLECTIONS: &str = "Listing collections";
pub const STEP_SUCCESS: &str = "Connection successful";

/// Runs connection diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionDiagnostics {
    settings: ProbeSettings,
}

impl ConnectionDiagnostics {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    /// Run diagnostics for a connection spec. Never fails; panics inside the
    /// run are reported as an internal failure.
    pub async fn test_connection(&self, spec: &ConnectionSpec) -> ConnectionResult {
        let span = info_span!("diagnostics", run_id = %Uuid::new_v4(), backend = %spec.kind());

        catch_panic(self.run(spec), |err| {
            rejected(&err, "Connection test failed unexpectedly")
        })
        .instrument(span)
        .await
    }

    async fn run(&self, spec: &ConnectionSpec) -> ConnectionResult {
        let mut trace = StepTrace::new();

        trace.begin(STEP_VALIDATE);
        if let Err(e) = spec.validate() {
            warn!(error = %e, "Credential validation failed");
            return trace.finish_failed("Invalid credentials format", &e);
        }

        trace.begin(STEP_CONNECT);
        let mut conn =
            match BackendConnection::open(spec, self.settings, ConnectScope::Server).await {
                Ok(conn) => conn,
                Err(e) => return fail(trace, spec, e),
            };

        let outcome = catch_panic(check_connection(&mut conn, spec, &mut trace), Err).await;
        conn.release().await;

        match outcome {
            Ok(found) => {
                let message = format!(
                    "Successfully connected to {} database '{}' ({} {} found)",
                    spec.kind().display_name(),
                    spec.database(),
                    found,
                    spec.kind().container_noun()
                );
                trace.begin(STEP_SUCCESS);
                info!(target_db = %spec.database(), found, "Connection test succeeded");
                trace.succeed(message)
            }
            Err(e) => fail(trace, spec, e),
        }
    }
}

/// Steps 3 to 5 against an open connection. Returns the container count.
async fn check_connection(
    conn: &mut BackendConnection,
    spec: &ConnectionSpec,
    trace: &mut StepTrace,
) -> DbResult<usize> {
    let kind = spec.kind();

    trace.begin(STEP_AUTHENTICATE);
    conn.authenticate().await?;

    trace.begin(STEP_DATABASE);
    let databases = conn
        .check_database(spec.database())
        .await
        .map_err(|e| match e {
            DbError::Privilege { reason, .. } => DbError::access(spec.database(), reason),
            other => other.for_database(spec.database()),
        })?;
    if let Some(count) = databases {
        trace.annotate("databases_found", count);
    }

    trace.begin(if kind.is_relational() {
        STEP_SELECT
    } else {
        STEP_COLLECTIONS
    });
    let found = conn.probe_read().await?;
    let key = match kind {
        BackendKind::Mongo => "collections_found",
        BackendKind::MySql | BackendKind::Postgres => "tables_found",
    };
    trace.annotate(key, found);

    Ok(found)
}

fn fail(trace: StepTrace, spec: &ConnectionSpec, err: DbError) -> ConnectionResult {
    warn!(error = %err, kind = %err.kind(), "Connection test failed");
    trace.finish_failed(failure_message(spec, &err), &err)
}

/// User-facing summary for a failed run.
pub fn failure_message(spec: &ConnectionSpec, err: &DbError) -> String {
    match (err, spec) {
        (DbError::Validation { .. }, _) => "Invalid credentials format".to_string(),
        (
            DbError::Connectivity { .. } | DbError::Timeout { .. },
            ConnectionSpec::MySql(s) | ConnectionSpec::Postgres(s),
        ) => format!(
            "Cannot reach host '{}:{}'. Check host/port and network.",
            s.host, s.port
        ),
        (DbError::Connectivity { .. } | DbError::Timeout { .. }, ConnectionSpec::Mongo(_)) => {
            "Cannot reach MongoDB cluster. Check the connection string and network access."
                .to_string()
        }
        (DbError::Authentication { .. }, ConnectionSpec::MySql(s) | ConnectionSpec::Postgres(s)) => {
            format!("Access denied for user '{}'. Check username/password.", s.user)
        }
        (DbError::Authentication { .. }, ConnectionSpec::Mongo(_)) => {
            "Authentication failed. Check username/password and authSource.".to_string()
        }
        (DbError::Access { .. }, _) => format!("Cannot access database '{}'", spec.database()),
        (DbError::Privilege { reason, .. }, ConnectionSpec::Mongo(_)) => {
            format!("Listing collections failed: {}", reason)
        }
        (DbError::Privilege { reason, .. }, _) => {
            format!("SELECT privilege test failed: {}", reason)
        }
        (DbError::DriverUnavailable { driver }, _) => {
            format!("{} driver is not available", driver)
        }
        (other, _) => format!("Connection failed: {}", other),
    }
}

/// Result for a request that was rejected before any check could run, e.g.
/// an unknown backend tag.
pub fn rejected(err: &DbError, message: &str) -> ConnectionResult {
    let mut trace = StepTrace::new();
    trace.begin(STEP_VALIDATE);
    trace.finish_failed(message, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionRequest, StepStatus};
    use std::time::Duration;

    fn relational(kind: BackendKind, port: u16) -> ConnectionSpec {
        ConnectionRequest {
            host: Some("127.0.0.1".into()),
            port: Some(port),
            database: Some("shop".into()),
            user: Some("reader".into()),
            password: Some("secret".into()),
            ..Default::default()
        }
        .into_spec(kind)
    }

    fn fast_settings() -> ProbeSettings {
        ProbeSettings {
            connect_timeout: Duration::from_secs(2),
            query_timeout: Duration::from_secs(2),
            server_selection_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_first_step() {
        let spec = ConnectionRequest {
            host: Some("127.0.0.1".into()),
            database: Some("shop".into()),
            ..Default::default()
        }
        .into_spec(BackendKind::MySql);

        let result = ConnectionDiagnostics::default().test_connection(&spec).await;

        assert!(!result.success);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].label, STEP_VALIDATE);
        assert_eq!(result.steps[0].status, StepStatus::Failed);
        assert_eq!(result.steps[0].error.as_deref(), Some("Missing required credentials"));
        assert_eq!(result.message, "Invalid credentials format");
        assert!(result.is_well_formed());
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_at_connect() {
        for kind in [BackendKind::MySql, BackendKind::Postgres] {
            let spec = relational(kind, 1);
            let result = ConnectionDiagnostics::new(fast_settings())
                .test_connection(&spec)
                .await;

            assert!(!result.success, "{kind}");
            assert_eq!(result.steps.len(), 2, "{kind}");
            assert_eq!(result.steps[1].label, STEP_CONNECT);
            assert_eq!(result.steps[1].status, StepStatus::Failed);
            assert_eq!(
                result.message,
                "Cannot reach host '127.0.0.1:1'. Check host/port and network."
            );
            assert!(result.is_well_formed());
        }
    }

    #[test]
    fn test_failure_messages() {
        let spec = relational(BackendKind::MySql, 3306);
        assert_eq!(
            failure_message(&spec, &DbError::authentication("x")),
            "Access denied for user 'reader'. Check username/password."
        );
        assert_eq!(
            failure_message(&spec, &DbError::access("", "unknown database")),
            "Cannot access database 'shop'"
        );
        assert!(
            failure_message(&spec, &DbError::privilege("SELECT", "denied"))
                .starts_with("SELECT privilege test failed")
        );
    }

    #[test]
    fn test_rejected_is_single_failed_step() {
        let result = rejected(&DbError::unsupported_backend("oracle"), "Unsupported backend");
        assert_eq!(result.steps.len(), 1);
        assert!(result.is_well_formed());
        assert_eq!(
            result.error_kind,
            Some(crate::error::ErrorKind::UnsupportedBackend)
        );
    }
}
