//! MongoDB adapter.
//!
//! Queries arrive as JSON text (see [`DocumentQuery`]) and results are
//! flattened into the same column/row shape the relational backends produce.
//! Schemas are inferred by sampling documents from every non-system
//! collection.

use crate::config::ProbeSettings;
use crate::db::backend::{BackendAdapter, QueryRows, read_check_error, with_timeout};
use crate::db::types::{decode_binary_value, float_value};
use crate::db::uri::{inject_credentials, looks_like_escaping_error, repair_escaping};
use crate::error::{DbError, DbResult};
use crate::models::{
    BackendKind, ColumnDefinition, DocumentQuery, DocumentSpec, MAX_ROW_LIMIT, TableSchema,
    mask_connection_string,
};
use futures_util::{StreamExt, TryStreamExt};
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::Client;
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

const APP_NAME: &str = "db-probe-server";

/// Databases that hold cluster metadata rather than user data.
const SYSTEM_DATABASES: &[&str] = &["admin", "local", "config"];

/// Pipeline stages that write to the server.
const WRITE_STAGES: &[&str] = &["$out", "$merge"];

fn is_system_collection(name: &str) -> bool {
    name.starts_with("system.")
}

/// Check that `database` is among the names the cluster reports. Returns how
/// many databases were listed.
fn require_listed(names: &[String], database: &str) -> DbResult<usize> {
    if names.iter().any(|name| name == database) {
        Ok(names.len())
    } else {
        Err(DbError::access(database, "database not found on the cluster"))
    }
}

async fn parse_options(uri: &str, settings: ProbeSettings) -> DbResult<ClientOptions> {
    let mut options = with_timeout(settings.connect_timeout, "parse connection string", async {
        ClientOptions::parse(uri).await.map_err(DbError::from)
    })
    .await?;

    options.connect_timeout = Some(settings.connect_timeout);
    options.server_selection_timeout = Some(settings.server_selection_timeout);
    options.max_pool_size = Some(1);
    options.app_name = Some(APP_NAME.to_string());
    Ok(options)
}

/// Convert a JSON value (extended JSON accepted) into a BSON document.
fn json_to_document(value: JsonValue, what: &str) -> DbResult<Document> {
    match Bson::try_from(value) {
        Ok(Bson::Document(document)) => Ok(document),
        Ok(other) => Err(DbError::validation(format!(
            "Invalid MongoDB query: '{}' must be an object, got {}",
            what,
            bson_type_name(&other)
        ))),
        Err(e) => Err(DbError::validation(format!(
            "Invalid MongoDB query: '{}': {}",
            what, e
        ))),
    }
}

fn optional_document(
    map: Option<serde_json::Map<String, JsonValue>>,
    what: &str,
) -> DbResult<Option<Document>> {
    map.map(|m| json_to_document(JsonValue::Object(m), what))
        .transpose()
}

/// Reject aggregation pipelines containing write stages.
fn reject_write_stages(pipeline: &[Document]) -> DbResult<()> {
    for stage in pipeline {
        if let Some(keyword) = WRITE_STAGES.iter().find(|s| stage.contains_key(**s)) {
            warn!(stage = keyword, "Blocked write stage in aggregation pipeline");
            return Err(DbError::query_policy(*keyword));
        }
    }
    Ok(())
}

/// Map a BSON value onto a JSON scalar or null.
pub fn bson_to_scalar(value: &Bson) -> JsonValue {
    match value {
        Bson::Null | Bson::Undefined => JsonValue::Null,
        Bson::Boolean(b) => JsonValue::Bool(*b),
        Bson::Int32(i) => JsonValue::from(*i),
        Bson::Int64(i) => JsonValue::from(*i),
        Bson::Double(f) => float_value(*f),
        Bson::String(s) | Bson::Symbol(s) => JsonValue::String(s.clone()),
        Bson::ObjectId(oid) => JsonValue::String(oid.to_hex()),
        Bson::DateTime(dt) => JsonValue::String(
            dt.try_to_rfc3339_string()
                .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        ),
        Bson::Binary(binary) => decode_binary_value(&binary.bytes, true),
        Bson::Document(_) | Bson::Array(_) => {
            JsonValue::String(value.clone().into_relaxed_extjson().to_string())
        }
        other => collapse_extjson(other.clone().into_relaxed_extjson()),
    }
}

/// `{"$numberDecimal": "1.5"}` and other single-key wrappers collapse to their
/// string payload; anything else is serialized.
fn collapse_extjson(json: JsonValue) -> JsonValue {
    if let JsonValue::Object(ref map) = json {
        if map.len() == 1 {
            if let Some(JsonValue::String(s)) = map.values().next() {
                return JsonValue::String(s.clone());
            }
        }
    }
    JsonValue::String(json.to_string())
}

/// BSON type name as reported by `$type`.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::Undefined => "undefined",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::DbPointer(_) => "dbPointer",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::Symbol(_) => "symbol",
        Bson::JavaScriptCodeWithScope(_) => "javascriptWithScope",
        Bson::Int32(_) => "int",
        Bson::Timestamp(_) => "timestamp",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::MinKey => "minKey",
        Bson::MaxKey => "maxKey",
    }
}

/// Flatten documents into columns (sorted union of top-level keys) and rows.
pub fn normalize_documents(documents: &[Document]) -> QueryRows {
    let columns: Vec<String> = documents
        .iter()
        .flat_map(|d| d.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let rows = documents
        .iter()
        .map(|document| {
            columns
                .iter()
                .map(|col| {
                    let value = document.get(col).map_or(JsonValue::Null, bson_to_scalar);
                    (col.clone(), value)
                })
                .collect()
        })
        .collect();

    QueryRows {
        columns,
        rows,
        truncated: false,
    }
}

#[derive(Default)]
struct FieldStats {
    first_type: Option<&'static str>,
    present: usize,
    null_seen: bool,
}

/// Infer field definitions from sampled documents.
///
/// Fields keep first-seen order. The type is that of the first non-null
/// occurrence (`mixed` when only nulls were seen). A field is nullable when
/// it is missing from any sampled document or was null in one.
pub fn infer_columns(documents: &[Document]) -> Vec<ColumnDefinition> {
    let mut order: Vec<String> = Vec::new();
    let mut stats: HashMap<String, FieldStats> = HashMap::new();

    for document in documents {
        for (key, value) in document {
            let entry = stats.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                FieldStats::default()
            });
            entry.present += 1;
            if matches!(value, Bson::Null) {
                entry.null_seen = true;
            } else if entry.first_type.is_none() {
                entry.first_type = Some(bson_type_name(value));
            }
        }
    }

    let sampled = documents.len();
    order
        .into_iter()
        .filter_map(|name| {
            let field = stats.remove(&name)?;
            let nullable = field.present < sampled || field.null_seen;
            Some(
                ColumnDefinition::new(name.as_str(), field.first_type.unwrap_or("mixed"), nullable)
                    .with_primary_key(name == "_id")
                    .with_extra(format!("seen in {}/{} sampled documents", field.present, sampled)),
            )
        })
        .collect()
}

pub struct MongoAdapter {
    client: Client,
    database: String,
    settings: ProbeSettings,
}

impl MongoAdapter {
    /// Build a client for the connection string.
    ///
    /// Override credentials are spliced in first. If the driver rejects the
    /// string because of unescaped credentials, it is re-encoded and parsed
    /// once more.
    pub async fn connect(spec: &DocumentSpec, settings: ProbeSettings) -> DbResult<Self> {
        let uri = match spec.credential_override() {
            Some((username, password)) => {
                inject_credentials(&spec.connection_string, username, password)
            }
            None => spec.connection_string.clone(),
        };

        let options = match parse_options(&uri, settings).await {
            Ok(options) => options,
            Err(e) if looks_like_escaping_error(&e.to_string()) => {
                let repaired = repair_escaping(&uri);
                debug!(
                    uri = %mask_connection_string(&repaired),
                    "Retrying with re-encoded credentials"
                );
                parse_options(&repaired, settings).await?
            }
            Err(e) => return Err(e),
        };

        let client = Client::with_options(options)?;
        debug!(uri = %mask_connection_string(&uri), "MongoDB client created");

        Ok(Self {
            client,
            database: spec.database.clone(),
            settings,
        })
    }

    /// Limit for calls that may wait on server selection.
    fn op_timeout(&self) -> Duration {
        self.settings.server_selection_timeout + self.settings.query_timeout
    }

    async fn user_databases(&self) -> DbResult<Vec<String>> {
        let mut names = with_timeout(self.op_timeout(), "list databases", async {
            self.client
                .list_database_names()
                .await
                .map_err(DbError::from)
        })
        .await?;
        names.retain(|name| !SYSTEM_DATABASES.contains(&name.as_str()));
        names.sort();
        Ok(names)
    }

    async fn user_collections(&self, database: &str) -> DbResult<Vec<String>> {
        let mut names = with_timeout(self.op_timeout(), "list collections", async {
            self.client
                .database(database)
                .list_collection_names()
                .await
                .map_err(DbError::from)
        })
        .await?;
        names.retain(|name| !is_system_collection(name));
        names.sort();
        Ok(names)
    }

    async fn fetch_documents(&self, query: DocumentQuery) -> DbResult<Vec<Document>> {
        let (database, collection) = query.namespace(&self.database);
        let collection = self
            .client
            .database(database)
            .collection::<Document>(collection);
        let limit = query
            .effective_limit(self.settings.document_row_limit)
            .min(MAX_ROW_LIMIT as i64);

        if let Some(stages) = query.aggregate.clone() {
            let pipeline = stages
                .into_iter()
                .map(|stage| json_to_document(stage, "aggregate"))
                .collect::<DbResult<Vec<_>>>()?;
            reject_write_stages(&pipeline)?;

            let cursor = collection.aggregate(pipeline).await?;
            return Ok(cursor.take(limit as usize).try_collect().await?);
        }

        let filter = optional_document(query.query.clone(), "query")?.unwrap_or_default();
        let mut options = FindOptions::default();
        options.projection = optional_document(query.projection.clone(), "projection")?;
        options.sort = optional_document(query.sort.clone(), "sort")?;
        options.limit = Some(limit);

        let cursor = collection.find(filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }
}

impl BackendAdapter for MongoAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Mongo
    }

    async fn authenticate(&mut self) -> DbResult<()> {
        with_timeout(self.op_timeout(), "ping", async {
            self.client
                .database("admin")
                .run_command(doc! { "ping": 1 })
                .await
                .map(|_| ())
                .map_err(DbError::from)
        })
        .await
    }

    async fn check_database(&mut self, database: &str) -> DbResult<Option<usize>> {
        let names = with_timeout(self.op_timeout(), "list databases", async {
            self.client
                .list_database_names()
                .await
                .map_err(DbError::from)
        })
        .await?;
        require_listed(&names, database).map(Some)
    }

    async fn probe_read(&mut self) -> DbResult<usize> {
        let database = self.database.clone();
        let collections = self
            .user_collections(&database)
            .await
            .map_err(|e| read_check_error("list collections", e))?;
        Ok(collections.len())
    }

    async fn run_query(&mut self, text: &str) -> DbResult<QueryRows> {
        let query = DocumentQuery::parse(text)?;
        debug!(collection = %query.collection, aggregate = query.is_aggregate(), "Running document query");

        let documents = with_timeout(self.op_timeout(), "query", self.fetch_documents(query)).await?;
        Ok(normalize_documents(&documents))
    }

    async fn list_containers(&mut self) -> DbResult<Vec<String>> {
        let mut containers = Vec::new();
        for database in self.user_databases().await? {
            for collection in self.user_collections(&database).await? {
                containers.push(format!("{}.{}", database, collection));
            }
        }
        Ok(containers)
    }

    async fn describe_container(&mut self, name: &str) -> DbResult<TableSchema> {
        let (database, collection) = match name.split_once('.') {
            Some((db, coll)) => (db, coll),
            None => (self.database.as_str(), name),
        };
        let sample_size = self.settings.schema_sample_size;

        let documents: Vec<Document> = with_timeout(self.op_timeout(), "sample collection", async {
            let cursor = self
                .client
                .database(database)
                .collection::<Document>(collection)
                .find(doc! {})
                .limit(sample_size)
                .await?;
            Ok(cursor.try_collect().await?)
        })
        .await?;

        Ok(infer_columns(&documents)
            .into_iter()
            .fold(TableSchema::new(name), TableSchema::with_column))
    }

    async fn close(self) -> DbResult<()> {
        self.client.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use serde_json::json;

    #[test]
    fn test_normalize_sorted_union_of_keys() {
        let docs = vec![doc! { "b": 1, "a": "x" }, doc! { "c": true }];
        let result = normalize_documents(&docs);

        assert_eq!(result.columns, vec!["a", "b", "c"]);
        assert_eq!(result.rows[0]["a"], json!("x"));
        assert_eq!(result.rows[0]["c"], JsonValue::Null);
        assert_eq!(result.rows[1]["c"], json!(true));
        assert_eq!(result.rows[1]["b"], JsonValue::Null);
    }

    #[test]
    fn test_scalar_conversions() {
        let oid = ObjectId::new();
        assert_eq!(bson_to_scalar(&Bson::ObjectId(oid)), json!(oid.to_hex()));
        assert_eq!(bson_to_scalar(&Bson::Int64(5)), json!(5));
        assert_eq!(bson_to_scalar(&Bson::Null), JsonValue::Null);

        let nested = bson_to_scalar(&Bson::Document(doc! { "x": 1 }));
        assert_eq!(nested, json!(r#"{"x":1}"#));

        let array = bson_to_scalar(&Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]));
        assert_eq!(array, json!("[1,2]"));
    }

    #[test]
    fn test_datetime_as_rfc3339() {
        let dt = mongodb::bson::DateTime::from_millis(0);
        assert_eq!(
            bson_to_scalar(&Bson::DateTime(dt)),
            json!("1970-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_infer_columns_nullable_and_coverage() {
        let docs = vec![
            doc! { "_id": 1, "name": "a", "age": Bson::Null },
            doc! { "_id": 2, "name": "b" },
        ];
        let columns = infer_columns(&docs);

        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].name, "_id");
        assert!(columns[0].is_primary_key);
        assert!(!columns[0].nullable);
        assert_eq!(columns[0].data_type, "int");

        assert_eq!(columns[1].name, "name");
        assert_eq!(columns[1].data_type, "string");
        assert!(!columns[1].nullable);

        assert_eq!(columns[2].name, "age");
        assert_eq!(columns[2].data_type, "mixed");
        assert!(columns[2].nullable);
        assert_eq!(columns[2].extra.as_deref(), Some("seen in 1/2 sampled documents"));
    }

    #[test]
    fn test_infer_columns_first_seen_type_wins() {
        let docs = vec![doc! { "v": "text" }, doc! { "v": 3 }];
        assert_eq!(infer_columns(&docs)[0].data_type, "string");
    }

    #[test]
    fn test_infer_columns_empty_sample() {
        assert!(infer_columns(&[]).is_empty());
    }

    #[test]
    fn test_write_stages_rejected() {
        let pipeline = vec![doc! { "$match": {} }, doc! { "$out": "copy" }];
        let err = reject_write_stages(&pipeline).unwrap_err();
        assert!(matches!(err, DbError::QueryPolicy { ref keyword } if keyword == "$out"));
        assert!(reject_write_stages(&[doc! { "$match": {} }]).is_ok());
    }

    #[test]
    fn test_json_to_document_rejects_non_objects() {
        assert!(json_to_document(json!({"a": 1}), "query").is_ok());
        assert!(json_to_document(json!([1]), "query").is_err());
    }

    #[test]
    fn test_normalize_empty_batch() {
        let result = normalize_documents(&[]);
        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());
        assert!(!result.truncated);
    }

    #[test]
    fn test_require_listed_matches_exact_name() {
        let names = vec!["admin".to_string(), "shop".to_string()];
        assert_eq!(require_listed(&names, "shop").unwrap(), 2);

        for missing in ["Shop", "sho", "inventory"] {
            match require_listed(&names, missing) {
                Err(DbError::Access { database, .. }) => assert_eq!(database, missing),
                other => panic!("expected access error, got {:?}", other),
            }
        }
        assert!(require_listed(&[], "shop").is_err());
    }

    #[test]
    fn test_system_collections() {
        assert!(is_system_collection("system.views"));
        assert!(!is_system_collection("systems"));
    }
}
