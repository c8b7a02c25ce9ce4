/// Chart inference: asks the model which fields to plot and how, then fills in
/// whatever it left out.

use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::{
    middleware::error_handling::{AppError, Result},
    models::chart::{ChartSpec, ChartType, IDENTITY_FIELD},
    services::{gemini_service::LanguageModel, json_extractor::extract_json, prompt_builder::build_axis_prompt},
    utils::log_sanitizer::sanitize_for_log,
};

/// Rows beyond this are not sent to the model
pub const MAX_SAMPLE_ROWS: usize = 20;

#[derive(Debug, Error, PartialEq)]
pub enum ChartResolveError {
    #[error("axis suggestion is not a JSON object")]
    NotAnObject,
    #[error("no usable {0}-axis field")]
    NoUsableAxis(&'static str),
}

pub struct ChartService {
    model: Arc<dyn LanguageModel>,
}

impl ChartService {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn infer_chart(&self, rows: &[Value]) -> Result<ChartSpec> {
        if rows.is_empty() || rows.iter().any(|row| !row.is_object()) {
            return Err(AppError::InvalidInput("Invalid or empty sampleData".to_string()));
        }

        let sample = &rows[..rows.len().min(MAX_SAMPLE_ROWS)];
        let prompt = build_axis_prompt(sample);
        let reply = self.model.complete(&prompt).await?;

        let value = extract_json(&reply).map_err(|e| failed_axes(&reply, e))?;
        let spec = resolve_chart_spec(&value).map_err(|e| failed_axes(&reply, e))?;

        tracing::info!(
            "Chart inferred: x={}, y={}, type={:?}",
            sanitize_for_log(&spec.x_axis),
            sanitize_for_log(&spec.y_axis),
            spec.chart_type
        );

        Ok(spec)
    }
}

fn failed_axes(reply: &str, reason: impl std::fmt::Display) -> AppError {
    tracing::error!("Failed to determine axes ({}): {}", reason, sanitize_for_log(reply));
    AppError::PlanExtraction("Failed to determine axes".to_string())
}

/// Apply the fallback rules to the model's axis suggestion:
/// identity field dropped everywhere, missing axis -> first option,
/// missing or unknown chart type -> bar chart.
pub fn resolve_chart_spec(value: &Value) -> std::result::Result<ChartSpec, ChartResolveError> {
    let object = value.as_object().ok_or(ChartResolveError::NotAnObject)?;

    let x_axis_options = axis_options(object, "xAxisOptions");
    let y_axis_options = axis_options(object, "yAxisOptions");

    let x_axis = axis_field(object, "xAxis")
        .or_else(|| x_axis_options.first().cloned())
        .ok_or(ChartResolveError::NoUsableAxis("x"))?;
    let y_axis = axis_field(object, "yAxis")
        .or_else(|| y_axis_options.first().cloned())
        .ok_or(ChartResolveError::NoUsableAxis("y"))?;

    let chart_type = match object.get("chartType").and_then(Value::as_str) {
        Some(tag) => ChartType::parse(tag).unwrap_or_else(|| {
            tracing::warn!("Unknown chart type {:?}, using barchart", sanitize_for_log(tag));
            ChartType::default()
        }),
        None => ChartType::default(),
    };

    Ok(ChartSpec {
        x_axis,
        y_axis,
        x_axis_options,
        y_axis_options,
        chart_type,
    })
}

fn usable(field: &str) -> bool {
    let field = field.trim();
    !field.is_empty() && field != IDENTITY_FIELD
}

fn axis_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|field| usable(field))
        .map(str::to_string)
}

fn axis_options(object: &Map<String, Value>, key: &str) -> Vec<String> {
    let mut options: Vec<String> = Vec::new();
    if let Some(Value::Array(entries)) = object.get(key) {
        for field in entries.iter().filter_map(Value::as_str) {
            if usable(field) && !options.iter().any(|o| o == field) {
                options.push(field.to_string());
            }
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gemini_service::ModelError;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedModel(&'static str);

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn complete(&self, _prompt: &str) -> std::result::Result<String, ModelError> {
            Ok(self.0.to_string())
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_complete_suggestion_kept() {
        let spec = resolve_chart_spec(&json!({
            "xAxis": "date",
            "yAxis": "sales",
            "xAxisOptions": ["date", "region"],
            "yAxisOptions": ["sales", "profit"],
            "chartType": "linechart"
        }))
        .unwrap();

        assert_eq!(spec.x_axis, "date");
        assert_eq!(spec.y_axis, "sales");
        assert_eq!(spec.x_axis_options, vec!["date", "region"]);
        assert_eq!(spec.chart_type, ChartType::Line);
    }

    #[test]
    fn test_missing_axes_fall_back_to_first_option() {
        let spec = resolve_chart_spec(&json!({
            "xAxis": null,
            "xAxisOptions": ["category", "name"],
            "yAxisOptions": ["amount"]
        }))
        .unwrap();

        assert_eq!(spec.x_axis, "category");
        assert_eq!(spec.y_axis, "amount");
    }

    #[test]
    fn test_missing_chart_type_defaults_to_bar() {
        let spec = resolve_chart_spec(&json!({"xAxis": "role", "yAxis": "count"})).unwrap();
        assert_eq!(spec.chart_type, ChartType::Bar);

        let spec = resolve_chart_spec(&json!({"xAxis": "role", "yAxis": "count", "chartType": "radar"}))
            .unwrap();
        assert_eq!(spec.chart_type, ChartType::Bar);
    }

    #[test]
    fn test_identity_field_never_chosen() {
        let spec = resolve_chart_spec(&json!({
            "xAxis": "_id",
            "yAxis": "_id",
            "xAxisOptions": ["_id", "name"],
            "yAxisOptions": ["_id", "age"]
        }))
        .unwrap();

        assert_eq!(spec.x_axis, "name");
        assert_eq!(spec.y_axis, "age");
        assert!(!spec.x_axis_options.contains(&IDENTITY_FIELD.to_string()));
        assert!(!spec.y_axis_options.contains(&IDENTITY_FIELD.to_string()));
    }

    #[test]
    fn test_no_usable_axis() {
        assert_eq!(
            resolve_chart_spec(&json!({"xAxis": "_id", "yAxis": "sales"})),
            Err(ChartResolveError::NoUsableAxis("x"))
        );
        assert_eq!(
            resolve_chart_spec(&json!({"xAxis": "date", "yAxisOptions": []})),
            Err(ChartResolveError::NoUsableAxis("y"))
        );
        assert_eq!(
            resolve_chart_spec(&json!(["date", "sales"])),
            Err(ChartResolveError::NotAnObject)
        );
    }

    #[tokio::test]
    async fn test_infer_chart_for_time_series() {
        let service = ChartService::new(Arc::new(FixedModel(
            "```json\n{\"xAxis\": \"date\", \"yAxis\": \"sales\", \"xAxisOptions\": [\"date\"], \"yAxisOptions\": [\"sales\"], \"chartType\": \"linechart\"}\n```",
        )));
        let rows = vec![
            json!({"date": "2024-01-01", "sales": 100}),
            json!({"date": "2024-01-02", "sales": 150}),
        ];

        let spec = service.infer_chart(&rows).await.unwrap();

        assert_eq!(spec.x_axis, "date");
        assert_eq!(spec.y_axis, "sales");
        assert_eq!(spec.chart_type, ChartType::Line);
    }

    #[tokio::test]
    async fn test_infer_chart_rejects_bad_input() {
        let service = ChartService::new(Arc::new(FixedModel("{}")));

        assert!(matches!(service.infer_chart(&[]).await, Err(AppError::InvalidInput(_))));
        assert!(matches!(
            service.infer_chart(&[json!(1), json!(2)]).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_infer_chart_unparseable_reply() {
        let service = ChartService::new(Arc::new(FixedModel("I'd use a bar chart.")));
        let result = service.infer_chart(&[json!({"role": "admin"})]).await;
        assert!(matches!(result, Err(AppError::PlanExtraction(ref msg)) if msg == "Failed to determine axes"));
    }
}
