//! Schema-related data models.
//!
//! This module defines the uniform table/column model returned by schema
//! introspection for every backend.

use crate::models::BackendKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDefinition {
    pub name: String,
    /// Declared type (e.g., `varchar(30)`), or the inferred BSON type for MongoDB
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    /// Default value with appropriate JSON type based on column data type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_primary_key: bool,
    /// e.g. `auto_increment`, or MongoDB sampling coverage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl ColumnDefinition {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default: None,
            is_primary_key: false,
            extra: None,
        }
    }

    /// Set whether this is a primary key column.
    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// Set the default value from a string, converting to appropriate JSON type
    /// based on the column's data_type.
    pub fn with_default_str(mut self, default_str: &str) -> Self {
        self.default = Some(parse_default_value(default_str, &self.data_type));
        self
    }

    /// Set the extra attributes. Empty strings are ignored.
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        let extra = extra.into();
        if !extra.is_empty() {
            self.extra = Some(extra);
        }
        self
    }
}

/// A table (relational) or `database.collection` (MongoDB) with its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column definition.
    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }
}

/// Full schema of one target plus autocomplete keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableSchema>,
    pub keywords: Vec<String>,
}

impl SchemaDescriptor {
    pub fn new(kind: BackendKind, tables: Vec<TableSchema>) -> Self {
        Self {
            tables,
            keywords: keywords_for(kind).iter().map(|k| k.to_string()).collect(),
        }
    }
}

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "IN", "LIKE", "BETWEEN", "IS", "NULL", "AS",
    "DISTINCT", "JOIN", "INNER JOIN", "LEFT JOIN", "RIGHT JOIN", "ON", "GROUP BY", "HAVING",
    "ORDER BY", "ASC", "DESC", "LIMIT", "OFFSET", "UNION", "UNION ALL", "CASE", "WHEN", "THEN",
    "ELSE", "END", "EXISTS", "COUNT", "SUM", "AVG", "MIN", "MAX", "COALESCE", "CAST", "WITH",
];

const MYSQL_KEYWORDS: &[&str] = &[
    "SHOW TABLES", "SHOW DATABASES", "DESCRIBE", "EXPLAIN", "IFNULL", "CONCAT", "GROUP_CONCAT",
    "DATE_FORMAT", "NOW", "CURDATE",
];

const POSTGRES_KEYWORDS: &[&str] = &[
    "ILIKE", "RETURNING", "EXPLAIN", "STRING_AGG", "ARRAY_AGG", "NOW", "CURRENT_DATE",
    "DATE_TRUNC", "EXTRACT", "FILTER",
];

const MONGO_KEYWORDS: &[&str] = &[
    "collection", "query", "projection", "sort", "limit", "aggregate", "$match", "$group",
    "$project", "$sort", "$limit", "$skip", "$unwind", "$lookup", "$count", "$eq", "$ne", "$gt",
    "$gte", "$lt", "$lte", "$in", "$nin", "$and", "$or", "$not", "$exists", "$regex", "$sum",
    "$avg",
];

/// Static autocomplete keywords for a backend's query language.
pub fn keywords_for(kind: BackendKind) -> Vec<&'static str> {
    match kind {
        BackendKind::MySql => SQL_KEYWORDS.iter().chain(MYSQL_KEYWORDS).copied().collect(),
        BackendKind::Postgres => SQL_KEYWORDS.iter().chain(POSTGRES_KEYWORDS).copied().collect(),
        BackendKind::Mongo => MONGO_KEYWORDS.to_vec(),
    }
}

/// Parse a default value string into the appropriate JSON type based on column data type.
///
/// - Integer types (int, bigint, smallint, tinyint) → JSON Number
/// - Float types (float, double, real) → JSON Number
/// - Boolean types → JSON Boolean
/// - JSON/JSONB types → Parsed JSON value
/// - Everything else, including expressions and decimals → JSON String
pub fn parse_default_value(default_str: &str, data_type: &str) -> serde_json::Value {
    let dt_lower = data_type.to_lowercase();

    if dt_lower.contains("int") || dt_lower.contains("serial") {
        if let Ok(n) = default_str.parse::<i64>() {
            return serde_json::Value::Number(n.into());
        }
    }

    if dt_lower.contains("float") || dt_lower.contains("double") || dt_lower == "real" {
        if let Some(num) = default_str
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return serde_json::Value::Number(num);
        }
    }

    if dt_lower.contains("bool") {
        match default_str.to_lowercase().as_str() {
            "true" | "1" | "t" => return serde_json::Value::Bool(true),
            "false" | "0" | "f" => return serde_json::Value::Bool(false),
            _ => {}
        }
    }

    if dt_lower == "json" || dt_lower == "jsonb" {
        if let Ok(parsed) = serde_json::from_str(default_str) {
            return parsed;
        }
    }

    serde_json::Value::String(default_str.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_schema_builder() {
        let schema = TableSchema::new("users")
            .with_column(ColumnDefinition::new("id", "bigint", false).with_primary_key(true))
            .with_column(ColumnDefinition::new("name", "varchar(50)", true));

        assert_eq!(schema.columns.len(), 2);
        assert!(schema.columns[0].is_primary_key);
    }

    #[test]
    fn test_column_serialization_shape() {
        let column = ColumnDefinition::new("email", "varchar(255)", true);
        let json = serde_json::to_value(&column).unwrap();

        assert_eq!(json["name"], "email");
        assert_eq!(json["type"], "varchar(255)");
        assert_eq!(json["nullable"], true);
        assert!(json.get("default").is_none());
        assert!(json.get("is_primary_key").is_none());
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn test_empty_extra_ignored() {
        let column = ColumnDefinition::new("id", "int", false).with_extra("");
        assert!(column.extra.is_none());
        let column = ColumnDefinition::new("id", "int", false).with_extra("auto_increment");
        assert_eq!(column.extra.as_deref(), Some("auto_increment"));
    }

    #[test]
    fn test_keywords_per_backend() {
        let mysql = keywords_for(BackendKind::MySql);
        assert!(mysql.contains(&"SELECT"));
        assert!(mysql.contains(&"SHOW TABLES"));

        let pg = keywords_for(BackendKind::Postgres);
        assert!(pg.contains(&"ILIKE"));
        assert!(!pg.contains(&"SHOW TABLES"));

        let mongo = keywords_for(BackendKind::Mongo);
        assert!(mongo.contains(&"$match"));
        assert!(!mongo.contains(&"SELECT"));
    }

    #[test]
    fn test_descriptor_carries_keywords() {
        let descriptor = SchemaDescriptor::new(BackendKind::Mongo, vec![]);
        assert!(descriptor.tables.is_empty());
        assert!(!descriptor.keywords.is_empty());
    }

    #[test]
    fn test_parse_default_value_integer_types() {
        assert_eq!(
            parse_default_value("0", "tinyint unsigned"),
            serde_json::json!(0)
        );
        assert_eq!(parse_default_value("-100", "bigint"), serde_json::json!(-100));
    }

    #[test]
    fn test_parse_default_value_float_and_decimal() {
        assert_eq!(parse_default_value("1.5", "float"), serde_json::json!(1.5));
        assert_eq!(
            parse_default_value("99.99", "numeric(5,2)"),
            serde_json::json!("99.99")
        );
    }

    #[test]
    fn test_parse_default_value_boolean() {
        assert_eq!(parse_default_value("t", "boolean"), serde_json::json!(true));
        assert_eq!(parse_default_value("0", "bool"), serde_json::json!(false));
    }

    #[test]
    fn test_parse_default_value_expressions_stay_strings() {
        assert_eq!(
            parse_default_value("CURRENT_TIMESTAMP", "timestamp"),
            serde_json::json!("CURRENT_TIMESTAMP")
        );
        assert_eq!(
            parse_default_value("nextval('users_id_seq'::regclass)", "integer"),
            serde_json::json!("nextval('users_id_seq'::regclass)")
        );
    }

    #[test]
    fn test_parse_default_value_json() {
        assert_eq!(parse_default_value("{}", "json"), serde_json::json!({}));
        assert_eq!(
            parse_default_value("not json", "jsonb"),
            serde_json::json!("not json")
        );
    }
}
