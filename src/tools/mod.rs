//! Tool implementations.
//!
//! - `probe`: handlers for `test_connection`, `execute_query` and `get_schema`
//! - `guard`: first-token write-statement guard for query text
//! - `format`: table/markdown rendering of query results

pub mod format;
pub mod guard;
pub mod probe;

pub use format::OutputFormat;
pub use guard::{GuardResult, check_query};
pub use probe::{ExecuteQueryInput, ProbeToolHandler, QueryOutput};
