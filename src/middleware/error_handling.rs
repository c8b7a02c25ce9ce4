// ============================================================================
// Error Handling - Request Boundary Error Responses
// ============================================================================
//
// Every failure in the query pipeline ends up here as an `AppError`, which is
// turned into `{ "error": ..., "status": ... }`.
//
// Principles:
//
// 1. Upstream details (driver errors, raw model replies, HTTP bodies from the
//    model provider) are logged server-side with `tracing::error!` and never
//    echoed to the client.
// 2. Messages we author ourselves (missing fields, "No collections found in
//    database", invalid plan) are safe to return as-is.
// 3. Nothing escapes as a panic. Partial success in multi-collection execution
//    is not an error at all and never reaches this module.
//
// ============================================================================

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::services::gemini_service::ModelError;
use crate::services::mongo_gateway::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] JsonRejection),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Model request failed: {0}")]
    UpstreamModel(#[from] ModelError),

    #[error("Plan extraction failed: {0}")]
    PlanExtraction(String),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(detail) => AppError::Connection(detail),
            other => AppError::QueryExecution(other.to_string()),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Json(_) | AppError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamModel(_) | AppError::Connection(_) => StatusCode::BAD_GATEWAY,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::PlanExtraction(_) | AppError::QueryExecution(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match self {
            AppError::Validation(ref e) => {
                tracing::warn!("Request validation failed: {}", e);
                "Missing required fields".to_string()
            }
            AppError::Json(ref e) => {
                tracing::warn!("Rejected request body: {}", e);
                "Invalid JSON".to_string()
            }
            AppError::InvalidInput(msg) => msg,
            AppError::NotFound(msg) => msg,
            AppError::UpstreamModel(ref e) => {
                tracing::error!("Model error: {:?}", e);
                "Model service unavailable".to_string()
            }
            AppError::PlanExtraction(msg) => msg,
            AppError::QueryExecution(ref detail) => {
                tracing::error!("Query execution error: {}", detail);
                "Query execution failed".to_string()
            }
            AppError::Connection(ref detail) => {
                tracing::error!("Database connection error: {}", detail);
                "Database connection failed".to_string()
            }
            AppError::TooManyRequests(msg) => msg,
            AppError::Internal(ref err) => {
                tracing::error!("Internal error: {:?}", err);
                "Internal server error".to_string()
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("No collections found in database".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::UpstreamModel(ModelError::EmptyResponse).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::PlanExtraction("Invalid query generated by model".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_connection_details_not_leaked() {
        let response =
            AppError::Connection("auth failed for user admin:secret@host".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Database connection failed");
        assert_eq!(body["status"], 502);
    }
}
