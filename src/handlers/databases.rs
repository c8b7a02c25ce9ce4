use axum::{extract::{rejection::JsonRejection, State}, Json};

use crate::{
    middleware::error_handling::{AppError, Result},
    models::database::{DatabasesResponse, ListDatabasesRequest},
    AppState,
};

/// POST /api/databases
/// Every database behind the connection string with its collection names
pub async fn list_databases(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ListDatabasesRequest>, JsonRejection>,
) -> Result<Json<DatabasesResponse>> {
    let Json(request) = payload?;

    let uri = request
        .mongodb_uri
        .filter(|uri| !uri.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput("MongoDB URI is required".to_string()))?;

    let databases = state.nl_query_service().list_databases(&uri).await?;

    Ok(Json(DatabasesResponse { databases }))
}
