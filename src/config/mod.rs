pub mod tls;

use std::env;
use std::time::Duration;
use anyhow::{Context, Result};

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: env::var("GEMINI_API_KEY").context("GEMINI_API_KEY must be set")?,
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            temperature: env::var("GEMINI_TEMPERATURE")
                .unwrap_or_else(|_| "0.2".to_string())
                .parse()
                .context("Invalid GEMINI_TEMPERATURE")?,
            timeout: Duration::from_secs(
                env::var("GEMINI_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .context("Invalid GEMINI_TIMEOUT_SECS")?,
            ),
        })
    }

    /// Full generateContent endpoint for the configured model
    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// Caps applied to model-generated queries before they reach the store
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    pub find_result_limit: i64,
    pub aggregate_max_time: Duration,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            find_result_limit: 1000,
            aggregate_max_time: Duration::from_millis(60_000),
        }
    }
}

impl QueryLimits {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            find_result_limit: match env::var("FIND_RESULT_LIMIT") {
                Ok(v) => v.parse().context("Invalid FIND_RESULT_LIMIT")?,
                Err(_) => defaults.find_result_limit,
            },
            aggregate_max_time: match env::var("AGGREGATE_MAX_TIME_MS") {
                Ok(v) => Duration::from_millis(v.parse().context("Invalid AGGREGATE_MAX_TIME_MS")?),
                Err(_) => defaults.aggregate_max_time,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub limits: QueryLimits,
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub model_rate_limit_per_minute: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            gemini: GeminiConfig::from_env()?,
            limits: QueryLimits::from_env()?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            cors_origins,
            model_rate_limit_per_minute: env::var("MODEL_RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
