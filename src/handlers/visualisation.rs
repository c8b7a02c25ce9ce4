use axum::{extract::{rejection::JsonRejection, State}, Json};
use serde_json::Value;

use crate::{
    middleware::error_handling::{AppError, Result},
    models::chart::{ChartRequest, ChartSpec},
    services::ChartService,
    AppState,
};

/// POST /api/visualisation
/// Suggest chart axes and a chart type for a sample of result rows
pub async fn infer_chart(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChartRequest>, JsonRejection>,
) -> Result<Json<ChartSpec>> {
    let Json(request) = payload?;

    let rows = match request.sample_data {
        Some(Value::Array(rows)) if !rows.is_empty() => rows,
        _ => return Err(AppError::InvalidInput("Invalid or empty sampleData".to_string())),
    };

    let spec = ChartService::new(state.model.clone())
        .infer_chart(&rows)
        .await?;

    Ok(Json(spec))
}
