// ============================================================================
// Prometheus Metrics
// ============================================================================
//
// Metrics collected:
//
// - mqa_http_request_duration_seconds{method, path, status}  (histogram)
// - mqa_http_requests_total{method, path, status}            (counter)
// - mqa_model_calls_total{outcome}                           (counter)
// - mqa_collection_queries_total{mode, outcome}              (counter)
//
// Scraped from GET /metrics.
//
// ============================================================================

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "mqa_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path", "status"],
        // Model round-trips dominate, so the buckets reach past a minute
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("register http duration histogram");

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mqa_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("register http request counter");

    /// Model calls by outcome: success, request_error, status_error, malformed, empty
    pub static ref MODEL_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "mqa_model_calls_total",
        "Total number of calls to the text-generation model",
        &["outcome"]
    )
    .expect("register model call counter");

    /// Per-collection executions by plan mode (filter/pipeline) and outcome (success/empty/error)
    pub static ref COLLECTION_QUERIES_TOTAL: CounterVec = register_counter_vec!(
        "mqa_collection_queries_total",
        "Total number of per-collection query executions",
        &["mode", "outcome"]
    )
    .expect("register collection query counter");
}

/// Routes are static, but unknown paths would otherwise create a label per URL
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/api/query" => "/api/query",
        "/api/query/collection" => "/api/query/collection",
        "/api/databases" => "/api/databases",
        "/api/visualisation" => "/api/visualisation",
        "/api/health" => "/api/health",
        "/metrics" => "/metrics",
        _ => "other",
    }
}

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[method.as_str(), path, &status])
        .observe(duration.as_secs_f64());
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), path, &status])
        .inc();

    tracing::debug!(
        target: "metrics",
        method = %method,
        path = %path,
        status = %status,
        duration_ms = %duration.as_millis(),
        "HTTP request completed"
    );

    response
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

pub fn record_model_call(outcome: &str) {
    MODEL_CALLS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_collection_query(mode: &str, outcome: &str) {
    COLLECTION_QUERIES_TOTAL.with_label_values(&[mode, outcome]).inc();
}
