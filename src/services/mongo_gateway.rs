/// Database gateway: the narrow slice of the MongoDB driver the planner needs.
///
/// A connection is opened per request through a `StoreConnector` and closed by
/// the caller when the request is done. Filters and pipelines arrive as JSON
/// produced by the model and are converted to BSON here; their operators are
/// not interpreted.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{AggregateOptions, ClientOptions, FindOptions},
    Client,
};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

const APP_NAME: &str = "mongo-query-assistant";
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("invalid query document: {0}")]
    InvalidDocument(String),

    #[error("store operation failed: {0}")]
    Operation(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Operation(err.to_string())
    }
}

/// Opens one short-lived connection per request
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Box<dyn DocumentStore>, StoreError>;
}

/// An open connection to a document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_database_names(&self) -> Result<Vec<String>, StoreError>;

    async fn list_collection_names(&self, database: &str) -> Result<Vec<String>, StoreError>;

    /// First document of an unfiltered fetch, used as the collection's schema sample
    async fn find_one(&self, database: &str, collection: &str) -> Result<Option<Value>, StoreError>;

    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: &Map<String, Value>,
        limit: Option<i64>,
    ) -> Result<Vec<Value>, StoreError>;

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: &[Map<String, Value>],
        max_time: Duration,
    ) -> Result<Vec<Value>, StoreError>;

    /// Release the connection. Must be safe to call after a failed operation.
    async fn close(&self);
}

// ============================================================================
// BSON <-> JSON
// ============================================================================

/// Convert a model-generated JSON object into a BSON document. Extended JSON
/// wrappers such as `{"$oid": ...}` and `{"$date": ...}` become typed values;
/// anything the extended JSON parser rejects is serialized verbatim.
pub fn to_document(object: &Map<String, Value>) -> Result<Document, StoreError> {
    Document::try_from(object.clone())
        .or_else(|_| mongodb::bson::to_document(object))
        .map_err(|e| StoreError::InvalidDocument(e.to_string()))
}

/// Relaxed extended JSON, so ObjectIds come back as `{"$oid": "..."}`
pub fn to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

// ============================================================================
// MongoDB implementation
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoreConnector for MongoConnector {
    async fn connect(&self, uri: &str) -> Result<Box<dyn DocumentStore>, StoreError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        options.app_name = Some(APP_NAME.to_string());
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);

        let client =
            Client::with_options(options).map_err(|e| StoreError::Connection(e.to_string()))?;

        // The driver connects lazily; ping so a bad URI fails here and not mid-plan.
        if let Err(e) = client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
        {
            client.shutdown().await;
            return Err(StoreError::Connection(e.to_string()));
        }

        Ok(Box::new(MongoStore { client }))
    }
}

pub struct MongoStore {
    client: Client,
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn list_database_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.client.list_database_names(None, None).await?)
    }

    async fn list_collection_names(&self, database: &str) -> Result<Vec<String>, StoreError> {
        let mut names = self
            .client
            .database(database)
            .list_collection_names(None)
            .await?;
        names.sort();
        Ok(names)
    }

    async fn find_one(&self, database: &str, collection: &str) -> Result<Option<Value>, StoreError> {
        let document = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .find_one(None, None)
            .await?;
        Ok(document.map(to_json))
    }

    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: &Map<String, Value>,
        limit: Option<i64>,
    ) -> Result<Vec<Value>, StoreError> {
        let filter = to_document(filter)?;
        let options = limit.map(|limit| FindOptions::builder().limit(limit).build());

        let cursor = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .find(filter, options)
            .await?;
        let documents: Vec<Document> = cursor.try_collect().await?;

        Ok(documents.into_iter().map(to_json).collect())
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: &[Map<String, Value>],
        max_time: Duration,
    ) -> Result<Vec<Value>, StoreError> {
        let stages = pipeline
            .iter()
            .map(to_document)
            .collect::<Result<Vec<_>, _>>()?;
        let options = AggregateOptions::builder().max_time(max_time).build();

        let cursor = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .aggregate(stages, options)
            .await?;
        let documents: Vec<Document> = cursor.try_collect().await?;

        Ok(documents.into_iter().map(to_json).collect())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}
