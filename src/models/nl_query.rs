/// Natural-language query models: request bodies, the parsed query plan and
/// the result sets returned to the client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use validator::Validate;

use crate::utils::log_sanitizer::redact_uri;

// ============================================================================
// Request-scoped entities
// ============================================================================

/// Where a request's queries run. Lives for one request only.
#[derive(Clone)]
pub struct ConnectionTarget {
    pub uri: String,
    pub database: String,
}

impl ConnectionTarget {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
        }
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("uri", &redact_uri(&self.uri))
            .field("database", &self.database)
            .finish()
    }
}

/// Collection name -> one sample document. Empty collections are left out.
pub type CollectionSchemas = BTreeMap<String, Value>;

// ============================================================================
// Query plan
// ============================================================================

/// A model-generated query, classified once when the reply is parsed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryPlan {
    /// Passed to `find()` as-is
    Filter(Map<String, Value>),
    /// Passed to `aggregate()` as-is, stage order preserved
    Pipeline(Vec<Map<String, Value>>),
}

impl QueryPlan {
    pub fn mode(&self) -> &'static str {
        match self {
            QueryPlan::Filter(_) => "filter",
            QueryPlan::Pipeline(_) => "pipeline",
        }
    }

    /// Classify a `query` value from a multi-collection envelope. Empty
    /// filters and empty pipelines are rejected.
    pub fn from_value(value: Value) -> Result<Self, PlanShapeError> {
        match value {
            Value::Object(filter) if filter.is_empty() => Err(PlanShapeError::EmptyQuery),
            Value::Object(filter) => Ok(QueryPlan::Filter(filter)),
            Value::Array(stages) if stages.is_empty() => Err(PlanShapeError::EmptyQuery),
            Value::Array(stages) => stages
                .into_iter()
                .enumerate()
                .map(|(index, stage)| match stage {
                    Value::Object(stage) => Ok(stage),
                    _ => Err(PlanShapeError::InvalidStage(index)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(QueryPlan::Pipeline),
            Value::Null => Err(PlanShapeError::MissingQuery),
            _ => Err(PlanShapeError::InvalidQueryType),
        }
    }

    /// Parse a bare filter document from the single-collection prompt.
    /// An empty object is allowed and matches every document.
    pub fn filter_document(value: Value) -> Result<Map<String, Value>, PlanShapeError> {
        match value {
            Value::Object(filter) => Ok(filter),
            _ => Err(PlanShapeError::InvalidQueryType),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PlanShapeError {
    #[error("model reply is not a JSON object")]
    NotAnObject,
    #[error("`collections` is missing or empty")]
    MissingCollections,
    #[error("`collections` must contain only strings")]
    InvalidCollectionName,
    #[error("`query` is missing")]
    MissingQuery,
    #[error("`query` is empty")]
    EmptyQuery,
    #[error("`query` must be an object or an array of stages")]
    InvalidQueryType,
    #[error("pipeline stage {0} is not an object")]
    InvalidStage(usize),
}

/// `{ "collections": [...], "query": ... }` as returned by the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEnvelope {
    pub collections: Vec<String>,
    pub query: QueryPlan,
}

impl PlanEnvelope {
    /// Shape-check the model's reply. Operator semantics are left to the store.
    pub fn from_value(value: Value) -> Result<Self, PlanShapeError> {
        let Value::Object(mut object) = value else {
            return Err(PlanShapeError::NotAnObject);
        };

        let names = match object.remove("collections") {
            Some(Value::Array(names)) if !names.is_empty() => names,
            _ => return Err(PlanShapeError::MissingCollections),
        };

        let mut collections: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            match name {
                Value::String(name) if !name.trim().is_empty() => {
                    if !collections.contains(&name) {
                        collections.push(name);
                    }
                }
                _ => return Err(PlanShapeError::InvalidCollectionName),
            }
        }

        let query = object.remove("query").unwrap_or(Value::Null);
        let query = QueryPlan::from_value(query)?;

        Ok(Self { collections, query })
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResult {
    pub collection: String,
    pub data: Vec<Value>,
}

/// Outcome of a multi-collection plan
#[derive(Debug, Clone)]
pub struct PlannedResults {
    pub plan: PlanEnvelope,
    pub results: Vec<CollectionResult>,
}

// ============================================================================
// API Request/Response Models
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct ExecuteQueryRequest {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub query: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub dbname: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub uri: String,
    #[serde(rename = "colName", default)]
    pub col_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<CollectionResult>,
    pub plan: PlanEnvelope,
    pub result_count: usize,
    pub execution_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SingleCollectionResponse {
    pub collection: String,
    pub data: Vec<Value>,
    pub result_count: usize,
    pub execution_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_query_becomes_pipeline() {
        let envelope = PlanEnvelope::from_value(json!({
            "collections": ["orders"],
            "query": [
                {"$lookup": {"from": "users", "localField": "userId", "foreignField": "_id", "as": "user"}},
                {"$match": {"user.age": {"$gt": 25}}}
            ]
        }))
        .unwrap();

        assert_eq!(envelope.collections, vec!["orders"]);
        match envelope.query {
            QueryPlan::Pipeline(stages) => {
                assert_eq!(stages.len(), 2);
                assert!(stages[0].contains_key("$lookup"));
            }
            other => panic!("expected pipeline, got {:?}", other),
        }
    }

    #[test]
    fn test_object_query_becomes_filter() {
        let envelope = PlanEnvelope::from_value(json!({
            "collections": ["users", "users"],
            "query": {"$and": [{"age": {"$gt": 25}}, {"location": "California"}]}
        }))
        .unwrap();

        assert_eq!(envelope.collections, vec!["users"]);
        assert_eq!(envelope.query.mode(), "filter");
    }

    #[test]
    fn test_envelope_rejects_missing_fields() {
        assert_eq!(
            PlanEnvelope::from_value(json!({"query": {"a": 1}})),
            Err(PlanShapeError::MissingCollections)
        );
        assert_eq!(
            PlanEnvelope::from_value(json!({"collections": [], "query": {"a": 1}})),
            Err(PlanShapeError::MissingCollections)
        );
        assert_eq!(
            PlanEnvelope::from_value(json!({"collections": ["users"]})),
            Err(PlanShapeError::MissingQuery)
        );
        assert_eq!(
            PlanEnvelope::from_value(json!({"collections": ["users"], "query": {}})),
            Err(PlanShapeError::EmptyQuery)
        );
        assert_eq!(
            PlanEnvelope::from_value(json!([{"name": "John"}])),
            Err(PlanShapeError::NotAnObject)
        );
    }

    #[test]
    fn test_envelope_rejects_bad_shapes() {
        assert_eq!(
            PlanEnvelope::from_value(json!({"collections": [1], "query": {"a": 1}})),
            Err(PlanShapeError::InvalidCollectionName)
        );
        assert_eq!(
            PlanEnvelope::from_value(json!({"collections": ["a"], "query": [{"$match": {}}, 3]})),
            Err(PlanShapeError::InvalidStage(1))
        );
        assert_eq!(
            PlanEnvelope::from_value(json!({"collections": ["a"], "query": "name = John"})),
            Err(PlanShapeError::InvalidQueryType)
        );
    }

    #[test]
    fn test_single_filter_allows_empty_object() {
        assert_eq!(QueryPlan::filter_document(json!({})).unwrap(), Map::new());
        assert_eq!(
            QueryPlan::filter_document(json!([{"$match": {}}])),
            Err(PlanShapeError::InvalidQueryType)
        );
    }

    #[test]
    fn test_plan_serializes_untagged() {
        let plan = QueryPlan::from_value(json!({"name": "John"})).unwrap();
        assert_eq!(serde_json::to_value(&plan).unwrap(), json!({"name": "John"}));
    }

    #[test]
    fn test_connection_target_debug_redacts_password() {
        let target = ConnectionTarget::new("mongodb://root:pw@localhost:27017", "test");
        let debug = format!("{:?}", target);
        assert!(!debug.contains(":pw@"));
        assert!(debug.contains("test"));
    }
}
