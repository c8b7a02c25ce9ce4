pub mod chart_service;
pub mod gemini_service;
pub mod json_extractor;
pub mod mongo_gateway;
pub mod nl_query_service;
pub mod prompt_builder;

pub use chart_service::ChartService;
pub use gemini_service::{GeminiService, LanguageModel, ModelError};
pub use mongo_gateway::{DocumentStore, MongoConnector, StoreConnector, StoreError};
pub use nl_query_service::NlQueryService;
