/// Natural Language Query Service - model-generated MongoDB queries
///
/// The model sees the collection names plus one sample document per collection
/// and answers with either a find() filter or an aggregation pipeline. The
/// service shape-checks that answer and runs it against every collection the
/// model named. It does not judge whether the query is sensible; the store does.

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use crate::{
    config::QueryLimits,
    middleware::error_handling::{AppError, Result},
    middleware::metrics::record_collection_query,
    models::{
        CollectionResult, CollectionSchemas, ConnectionTarget, DatabaseInfo, PlanEnvelope,
        PlannedResults, QueryPlan,
    },
    services::{
        gemini_service::LanguageModel,
        json_extractor::extract_json,
        mongo_gateway::{DocumentStore, StoreConnector, StoreError},
        prompt_builder::{build_query_prompt, build_single_collection_prompt},
    },
    utils::log_sanitizer::{redact_uri, sanitize_for_log},
};

pub struct NlQueryService {
    model: Arc<dyn LanguageModel>,
    connector: Arc<dyn StoreConnector>,
    limits: QueryLimits,
}

impl NlQueryService {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        connector: Arc<dyn StoreConnector>,
        limits: QueryLimits,
    ) -> Self {
        Self {
            model,
            connector,
            limits,
        }
    }

    /// Plan across every collection of the target database and run the plan
    /// on each collection the model picked.
    pub async fn plan_query(&self, query: &str, target: &ConnectionTarget) -> Result<PlannedResults> {
        require("query", query)?;
        require("dbname", &target.database)?;
        require("uri", &target.uri)?;

        tracing::info!(
            "NL query received: db={}, uri={}, query={}",
            target.database,
            redact_uri(&target.uri),
            sanitize_for_log(query)
        );

        let store = self.connect(&target.uri).await?;
        let result = self
            .plan_with_store(store.as_ref(), query, &target.database)
            .await;
        store.close().await;

        result
    }

    /// Plan against a single named collection and run the filter without a cap
    pub async fn plan_query_single(
        &self,
        query: &str,
        target: &ConnectionTarget,
        collection: &str,
    ) -> Result<Vec<Value>> {
        require("query", query)?;
        require("dbname", &target.database)?;
        require("uri", &target.uri)?;
        require("colName", collection)?;

        tracing::info!(
            "Single-collection NL query received: db={}, collection={}, query={}",
            target.database,
            sanitize_for_log(collection),
            sanitize_for_log(query)
        );

        let store = self.connect(&target.uri).await?;
        let result = self
            .plan_single_with_store(store.as_ref(), query, &target.database, collection)
            .await;
        store.close().await;

        result
    }

    /// Every database behind the URI with its collection names
    pub async fn list_databases(&self, uri: &str) -> Result<Vec<DatabaseInfo>> {
        require("mongodbUri", uri)?;

        let store = self.connect(uri).await?;
        let result = list_with_store(store.as_ref()).await;
        store.close().await;

        result
    }

    async fn connect(&self, uri: &str) -> Result<Box<dyn DocumentStore>> {
        self.connector.connect(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to {}: {}", redact_uri(uri), e);
            AppError::Connection(e.to_string())
        })
    }

    async fn plan_with_store(
        &self,
        store: &dyn DocumentStore,
        query: &str,
        database: &str,
    ) -> Result<PlannedResults> {
        // 1. Enumerate collections
        let collection_names = store.list_collection_names(database).await?;
        if collection_names.is_empty() {
            tracing::warn!("No collections found in database {}", database);
            return Err(AppError::NotFound("No collections found in database".to_string()));
        }
        tracing::debug!("Collections found: {:?}", collection_names);

        // 2. One sample document per collection
        let mut schemas = CollectionSchemas::new();
        for name in &collection_names {
            if let Some(sample) = store.find_one(database, name).await? {
                schemas.insert(name.clone(), sample);
            }
        }
        if schemas.is_empty() {
            tracing::warn!("Every collection in {} is empty", database);
            return Err(AppError::NotFound("No valid data found in collections".to_string()));
        }

        // 3. Ask the model
        let prompt = build_query_prompt(query, &collection_names, &schemas);
        let reply = self.model.complete(&prompt).await?;

        // 4. Extract and shape-check the plan before touching the store again
        let plan = parse_plan(&reply)?;
        tracing::info!(
            "Plan generated: mode={}, collections={:?}",
            plan.query.mode(),
            plan.collections
        );

        // 5. Run it on every target collection; failures are skipped, not fatal
        let plan_query = &plan.query;
        let executions = plan.collections.iter().map(|collection| async move {
            let outcome = self
                .execute_plan(store, database, collection, plan_query)
                .await;
            (collection, outcome)
        });

        let mut results = Vec::new();
        for (collection, outcome) in join_all(executions).await {
            match outcome {
                Ok(data) if data.is_empty() => {
                    record_collection_query(plan_query.mode(), "empty");
                    tracing::debug!("No documents matched in collection {}", collection);
                }
                Ok(data) => {
                    record_collection_query(plan_query.mode(), "success");
                    results.push(CollectionResult {
                        collection: collection.clone(),
                        data,
                    });
                }
                Err(e) => {
                    record_collection_query(plan_query.mode(), "error");
                    tracing::error!("Query error in collection {}: {}", collection, e);
                }
            }
        }

        tracing::info!(
            "NL query completed: {} of {} collections returned data",
            results.len(),
            plan.collections.len()
        );

        Ok(PlannedResults { plan, results })
    }

    async fn plan_single_with_store(
        &self,
        store: &dyn DocumentStore,
        query: &str,
        database: &str,
        collection: &str,
    ) -> Result<Vec<Value>> {
        let sample = store
            .find_one(database, collection)
            .await
            .map_err(|e| AppError::QueryExecution(e.to_string()))?;

        let prompt = build_single_collection_prompt(query, collection, sample.as_ref());
        let reply = self.model.complete(&prompt).await?;

        let value = extract_json(&reply).map_err(|e| invalid_plan(&reply, e))?;
        let filter = QueryPlan::filter_document(value).map_err(|e| invalid_plan(&reply, e))?;

        tracing::info!("Filter generated for collection {}", sanitize_for_log(collection));

        let documents = store
            .find(database, collection, &filter, None)
            .await
            .map_err(|e| {
                record_collection_query("filter", "error");
                AppError::QueryExecution(e.to_string())
            })?;
        record_collection_query("filter", if documents.is_empty() { "empty" } else { "success" });

        Ok(documents)
    }

    async fn execute_plan(
        &self,
        store: &dyn DocumentStore,
        database: &str,
        collection: &str,
        plan: &QueryPlan,
    ) -> std::result::Result<Vec<Value>, StoreError> {
        match plan {
            QueryPlan::Pipeline(stages) => {
                store
                    .aggregate(database, collection, stages, self.limits.aggregate_max_time)
                    .await
            }
            QueryPlan::Filter(filter) => {
                store
                    .find(database, collection, filter, Some(self.limits.find_result_limit))
                    .await
            }
        }
    }
}

async fn list_with_store(store: &dyn DocumentStore) -> Result<Vec<DatabaseInfo>> {
    let mut databases = Vec::new();
    for database in store.list_database_names().await? {
        let collections = store.list_collection_names(&database).await?;
        databases.push(DatabaseInfo {
            database,
            collections,
        });
    }
    Ok(databases)
}

/// Extract the JSON envelope from a model reply and check its shape
pub fn parse_plan(reply: &str) -> Result<PlanEnvelope> {
    let value = extract_json(reply).map_err(|e| invalid_plan(reply, e))?;
    PlanEnvelope::from_value(value).map_err(|e| invalid_plan(reply, e))
}

fn invalid_plan(reply: &str, reason: impl std::fmt::Display) -> AppError {
    tracing::error!(
        "Invalid plan from model ({}): {}",
        reason,
        sanitize_for_log(reply)
    );
    AppError::PlanExtraction("Invalid query generated by model".to_string())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("Missing required field: {}", field)));
    }
    Ok(())
}
