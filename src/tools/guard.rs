//! Write-statement guard for the query tool.
//!
//! A first-token keyword check: the query is rejected when any blocked verb
//! appears inside its first whitespace-delimited token. This over-blocks
//! (`UPDATE_LOG ...`) and under-blocks (`WITH x AS (...) DELETE ...`, or a
//! verb behind a leading comment). It is a courtesy check in front of
//! database accounts that should themselves be read-only, not a parser.

use crate::error::{DbError, DbResult};

/// Verbs rejected when they appear in the first token.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE",
];

/// Result of checking query text against the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardResult {
    Allowed,
    /// Carries the first blocked keyword found
    Blocked(&'static str),
}

impl GuardResult {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

/// Check query text against the blocked keywords.
///
/// # Examples
///
/// ```
/// use db_probe_server::tools::guard::{check_query, GuardResult};
///
/// assert_eq!(check_query("SELECT * FROM users"), GuardResult::Allowed);
/// assert_eq!(check_query("drop table users"), GuardResult::Blocked("DROP"));
/// // Substring match on the first token
/// assert_eq!(check_query("UPDATE_LOG SELECT 1"), GuardResult::Blocked("UPDATE"));
/// ```
pub fn check_query(text: &str) -> GuardResult {
    let upper = text.trim().to_uppercase();
    let Some(first_token) = upper.split_whitespace().next() else {
        return GuardResult::Allowed;
    };

    BLOCKED_KEYWORDS
        .iter()
        .find(|keyword| first_token.contains(**keyword))
        .map_or(GuardResult::Allowed, |keyword| GuardResult::Blocked(*keyword))
}

/// Reject blocked query text with a query policy error.
pub fn enforce_read_only(text: &str) -> DbResult<()> {
    match check_query(text) {
        GuardResult::Allowed => Ok(()),
        GuardResult::Blocked(keyword) => {
            tracing::warn!(keyword = keyword, "Blocked write statement");
            Err(DbError::query_policy(keyword))
        }
    }
}
