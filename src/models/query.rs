//! Query-related data models.
//!
//! This module defines the normalized query result shared by all backends and
//! the JSON query language accepted for MongoDB.

use crate::error::{DbError, DbResult, ErrorKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Maximum rows fetched from a relational query before truncating.
pub const MAX_ROW_LIMIT: usize = 10000;

/// Normalized result of a read query.
///
/// Every backend produces the same shape: ordered column names and rows keyed
/// by column, with values restricted to JSON scalars and null.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub success: bool,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// Milliseconds from request entry to result readiness.
    pub execution_time: u64,
    /// Set when the relational row cap cut the result short.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl QueryResult {
    /// Create a successful result. The row count is taken from `rows`.
    pub fn ok(
        columns: Vec<String>,
        rows: Vec<serde_json::Map<String, JsonValue>>,
        execution_time: u64,
    ) -> Self {
        Self {
            success: true,
            row_count: rows.len(),
            columns,
            rows,
            execution_time,
            truncated: false,
            error: None,
            error_kind: None,
        }
    }

    /// Create a failed result carrying the classified error.
    pub fn failed(error: &DbError, execution_time: u64) -> Self {
        Self {
            success: false,
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            execution_time,
            truncated: false,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A MongoDB query expressed as JSON text.
///
/// ```text
/// {"collection": "orders", "query": {"status": "A"}, "sort": {"_id": -1}, "limit": 10}
/// {"collection": "shop.orders", "aggregate": [{"$match": {"status": "A"}}]}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct DocumentQuery {
    /// `name` or `database.name`
    pub collection: String,
    #[serde(default, alias = "filter")]
    pub query: Option<serde_json::Map<String, JsonValue>>,
    #[serde(default)]
    pub projection: Option<serde_json::Map<String, JsonValue>>,
    #[serde(default)]
    pub sort: Option<serde_json::Map<String, JsonValue>>,
    #[serde(default)]
    pub limit: Option<i64>,
    /// When present, runs an aggregation pipeline instead of a find.
    #[serde(default, alias = "pipeline")]
    pub aggregate: Option<Vec<JsonValue>>,
}

impl DocumentQuery {
    /// Parse query text into a document query.
    pub fn parse(text: &str) -> DbResult<Self> {
        let query: Self = serde_json::from_str(text.trim()).map_err(|e| {
            DbError::validation(format!(
                "Invalid MongoDB query: {}. Expected JSON like {{\"collection\": \"name\", \"query\": {{}}}}",
                e
            ))
        })?;

        if query.collection.trim().is_empty() {
            return Err(DbError::validation(
                "Invalid MongoDB query: 'collection' must not be empty",
            ));
        }
        Ok(query)
    }

    /// Split `collection` into database and collection names.
    ///
    /// A dotted name selects the database before the first dot; otherwise
    /// `default_database` is used.
    pub fn namespace<'a>(&'a self, default_database: &'a str) -> (&'a str, &'a str) {
        match self.collection.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => (db, coll),
            _ => (default_database, self.collection.as_str()),
        }
    }

    /// Effective `limit`, falling back to `default` when absent or non-positive.
    pub fn effective_limit(&self, default: i64) -> i64 {
        self.limit.filter(|l| *l > 0).unwrap_or(default)
    }

    pub fn is_aggregate(&self) -> bool {
        self.aggregate.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_result_ok_counts_rows() {
        let mut row = serde_json::Map::new();
        row.insert("test".into(), serde_json::json!(1));
        let result = QueryResult::ok(vec!["test".into()], vec![row], 3);

        assert!(result.success);
        assert_eq!(result.row_count, 1);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_query_result_serialization() {
        let result = QueryResult::ok(vec![], vec![], 7);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["rowCount"], 0);
        assert_eq!(json["executionTime"], 7);
        assert!(json.get("truncated").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_query_result_failed() {
        let err = DbError::query_policy("DROP");
        let result = QueryResult::failed(&err, 0);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["errorKind"], "query_policy");
        assert!(json["error"].as_str().unwrap().contains("DROP"));
    }

    #[test]
    fn test_document_query_parse_find() {
        let q = DocumentQuery::parse(
            r#"{"collection": "orders", "query": {"status": "A"}, "sort": {"_id": -1}, "limit": 5}"#,
        )
        .unwrap();
        assert_eq!(q.collection, "orders");
        assert_eq!(q.effective_limit(1000), 5);
        assert!(!q.is_aggregate());
        assert_eq!(q.namespace("admin"), ("admin", "orders"));
    }

    #[test]
    fn test_document_query_parse_aggregate_with_namespace() {
        let q = DocumentQuery::parse(
            r#"{"collection": "shop.orders", "aggregate": [{"$match": {"x": 1}}]}"#,
        )
        .unwrap();
        assert!(q.is_aggregate());
        assert_eq!(q.namespace("admin"), ("shop", "orders"));
    }

    #[test]
    fn test_document_query_default_limit() {
        let q = DocumentQuery::parse(r#"{"collection": "c", "limit": 0}"#).unwrap();
        assert_eq!(q.effective_limit(1000), 1000);
    }

    #[test]
    fn test_document_query_rejects_non_json() {
        let err = DocumentQuery::parse("db.orders.find({})").unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }

    #[test]
    fn test_document_query_rejects_empty_collection() {
        assert!(DocumentQuery::parse(r#"{"collection": " "}"#).is_err());
        assert!(DocumentQuery::parse(r#"{"query": {}}"#).is_err());
    }
}
