/// Per-IP rate limiting for the endpoints that call the model.
///
/// Sliding window kept in memory: each client address keeps the instants of
/// its recent requests. Every accepted request costs one model call, so the
/// limit is expressed in requests per minute.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::time::sleep;

use crate::middleware::error_handling::AppError;

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

struct IpTracker {
    requests: Vec<Instant>,
    last_seen: Instant,
}

impl IpTracker {
    fn new() -> Self {
        Self {
            requests: Vec::new(),
            last_seen: Instant::now(),
        }
    }

    fn check_limit(&mut self, config: &RateLimitConfig) -> bool {
        let now = Instant::now();
        self.requests
            .retain(|&at| now.duration_since(at) < config.window);
        self.last_seen = now;

        if self.requests.len() >= config.max_requests as usize {
            return false;
        }

        self.requests.push(now);
        true
    }

    fn retry_after(&self, config: &RateLimitConfig) -> u64 {
        match self.requests.first() {
            Some(&oldest) => {
                let remaining = config.window.saturating_sub(oldest.elapsed());
                // Round up so clients never retry a moment too early
                remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
            }
            None => 0,
        }
    }
}

pub struct RateLimiter {
    trackers: Arc<DashMap<String, IpTracker>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let limiter = Self {
            trackers: Arc::new(DashMap::new()),
            config,
        };

        // Idle trackers are swept periodically when a runtime is available
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let trackers = limiter.trackers.clone();
            let idle_after = limiter.config.window * 2;
            handle.spawn(async move {
                loop {
                    sleep(Duration::from_secs(300)).await;
                    trackers.retain(|_, tracker| tracker.last_seen.elapsed() < idle_after);
                }
            });
        }

        limiter
    }

    /// `Err` carries the number of seconds until the next request would be accepted
    pub fn check(&self, ip: &str) -> Result<(), u64> {
        let mut entry = self
            .trackers
            .entry(ip.to_string())
            .or_insert_with(IpTracker::new);

        if entry.check_limit(&self.config) {
            Ok(())
        } else {
            Err(entry.retry_after(&self.config))
        }
    }
}

/// Requests served without connection info (tests, unix sockets) share one bucket
fn client_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    match limiter.check(&ip) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!("Rate limit exceeded for IP: {}", ip);
            let mut response = AppError::TooManyRequests(format!(
                "Rate limit exceeded. Try again in {} seconds.",
                retry_after
            ))
            .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::post, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_rate_limiter_allows_under_limit() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 3,
            window: Duration::from_secs(1),
        });

        assert!(limiter.check("127.0.0.1").is_ok());
        assert!(limiter.check("127.0.0.1").is_ok());
        assert!(limiter.check("127.0.0.1").is_ok());
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks_over_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(2));

        assert!(limiter.check("192.168.1.1").is_ok());
        assert!(limiter.check("192.168.1.1").is_ok());
        let retry_after = limiter.check("192.168.1.1").unwrap_err();
        assert!(retry_after > 0 && retry_after <= 60);
    }

    #[tokio::test]
    async fn test_different_ips_independent() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(1));

        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(limiter.check("10.0.0.2").is_ok());
    }

    #[tokio::test]
    async fn test_window_expiration() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(100),
        });

        assert!(limiter.check("172.16.0.1").is_ok());
        assert!(limiter.check("172.16.0.1").is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(limiter.check("172.16.0.1").is_ok());
    }

    #[tokio::test]
    async fn test_middleware_returns_429_with_retry_after() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::per_minute(1)));
        let app = Router::new()
            .route("/api/query", post(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ));

        let request = || {
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/query")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
    }
}
