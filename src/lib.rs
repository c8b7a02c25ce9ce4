pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::AppConfig,
    handlers::{
        databases::list_databases,
        health::health_check,
        query::{execute_collection_query, execute_query},
        visualisation::infer_chart,
    },
    middleware::{
        ip_rate_limiter::{rate_limit_middleware, RateLimitConfig, RateLimiter},
        metrics::{metrics_handler, metrics_middleware},
        request_id::{request_id_middleware, REQUEST_ID_HEADER},
    },
    services::{LanguageModel, NlQueryService, StoreConnector},
};

/// Shared per-process state. The model client and the store connector are
/// trait objects so tests can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub model: Arc<dyn LanguageModel>,
    pub connector: Arc<dyn StoreConnector>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        model: Arc<dyn LanguageModel>,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            model,
            connector,
        }
    }

    pub fn nl_query_service(&self) -> NlQueryService {
        NlQueryService::new(
            self.model.clone(),
            self.connector.clone(),
            self.config.limits,
        )
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    tracing::info!("CORS configured with {} allowed origins", allowed.len());

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

pub fn create_app(state: AppState) -> Router {
    let model_rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::per_minute(
        state.config.model_rate_limit_per_minute,
    )));

    // Every request on these routes costs at least one model call
    let model_routes = Router::new()
        .route("/query", post(execute_query))
        .route("/query/collection", post(execute_collection_query))
        .route("/visualisation", post(infer_chart))
        .layer(axum_middleware::from_fn_with_state(
            model_rate_limiter,
            rate_limit_middleware,
        ));

    let api = Router::new()
        .merge(model_routes)
        .route("/databases", post(list_databases))
        .route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(metrics_middleware))
                .layer(cors_layer(&state.config.cors_origins)),
        )
        .with_state(state)
}
