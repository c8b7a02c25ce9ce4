/// Natural-language query endpoints

use axum::{extract::{rejection::JsonRejection, State}, Json};
use std::time::Instant;
use validator::Validate;

use crate::{
    middleware::error_handling::{AppError, Result},
    models::nl_query::*,
    AppState,
};

/// POST /api/query
/// Plan across every collection of the database and run the plan on the
/// collections the model picked
pub async fn execute_query(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ExecuteQueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>> {
    let Json(request) = payload?;
    request.validate()?;

    let start = Instant::now();
    let target = ConnectionTarget::new(request.uri, request.dbname);

    let planned = state
        .nl_query_service()
        .plan_query(&request.query, &target)
        .await?;

    let result_count = planned.results.iter().map(|r| r.data.len()).sum();
    let execution_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "NL query completed: {} collections, {} documents in {}ms",
        planned.results.len(),
        result_count,
        execution_time_ms
    );

    Ok(Json(QueryResponse {
        results: planned.results,
        plan: planned.plan,
        result_count,
        execution_time_ms,
    }))
}

/// POST /api/query/collection
pub async fn execute_collection_query(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ExecuteQueryRequest>, JsonRejection>,
) -> Result<Json<SingleCollectionResponse>> {
    let Json(request) = payload?;
    request.validate()?;

    let collection = request
        .col_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput("Missing required field: colName".to_string()))?;

    let start = Instant::now();
    let target = ConnectionTarget::new(request.uri, request.dbname);

    let data = state
        .nl_query_service()
        .plan_query_single(&request.query, &target, &collection)
        .await?;

    Ok(Json(SingleCollectionResponse {
        collection,
        result_count: data.len(),
        data,
        execution_time_ms: start.elapsed().as_millis() as u64,
    }))
}
