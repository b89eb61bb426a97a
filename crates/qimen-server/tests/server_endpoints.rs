//! Router-level tests: health, stats and the cache-backed rate limiter.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use qimen_cache::{CacheConfig, CacheService};
use qimen_server::{AppConfig, AppState, RateLimitConfig, build_app};
use serde_json::Value;
use tower::ServiceExt;

fn test_app(max_requests: u32) -> (Router, CacheService) {
    let cache = CacheService::in_memory(CacheConfig::default());
    let config = AppConfig {
        rate_limit: RateLimitConfig {
            max_requests,
            window_secs: 60,
            ..RateLimitConfig::default()
        },
        ..AppConfig::default()
    };
    (build_app(AppState::new(cache.clone(), config)), cache)
}

fn get(uri: &str, client: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_memory_mode() {
    let (app, _) = test_app(10);

    let res = app.oneshot(get("/health", "198.51.100.1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));

    let body = json_body(res).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache"], "memory");
    assert_eq!(body["distributed_available"], false);
}

#[tokio::test]
async fn test_request_id_is_preserved() {
    let (app, _) = test_app(10);
    let req = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_stats_endpoint() {
    let (app, cache) = test_app(10);
    cache.set("user:42", &"a", None).await;

    let res = app
        .oneshot(get("/api/cache/stats", "198.51.100.2"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = json_body(res).await;
    assert_eq!(body["type"], "memory");
    assert_eq!(body["capacity"], 1000);
    // user:42 plus this client's rate-limit counter
    assert_eq!(body["size"], 2);
}

#[tokio::test]
async fn test_rate_limit_rejects_after_limit() {
    let (app, cache) = test_app(2);

    let first = app
        .clone()
        .oneshot(get("/api/cache/stats", "198.51.100.3"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

    let second = app
        .clone()
        .oneshot(get("/api/cache/stats", "198.51.100.3"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-ratelimit-remaining"], "0");

    let third = app
        .clone()
        .oneshot(get("/api/cache/stats", "198.51.100.3"))
        .await
        .unwrap();
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(third.headers()["retry-after"], "60");

    assert_eq!(cache.get::<i64>("ratelimit:198.51.100.3").await, Some(3));

    // Other clients have their own counters
    let other = app
        .oneshot(get("/api/cache/stats", "198.51.100.4"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let (app, cache) = test_app(1);

    for _ in 0..3 {
        let res = app
            .clone()
            .oneshot(get("/health", "198.51.100.5"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    assert!(!cache.exists("ratelimit:198.51.100.5").await);
}

#[tokio::test]
async fn test_rate_limit_disabled() {
    let cache = CacheService::in_memory(CacheConfig::default());
    let config = AppConfig {
        rate_limit: RateLimitConfig {
            enabled: false,
            max_requests: 1,
            ..RateLimitConfig::default()
        },
        ..AppConfig::default()
    };
    let app = build_app(AppState::new(cache, config));

    for _ in 0..3 {
        let res = app
            .clone()
            .oneshot(get("/api/cache/stats", "198.51.100.6"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.headers().contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn test_metrics_without_recorder_is_not_found() {
    let (app, _) = test_app(10);
    let res = app.oneshot(get("/metrics", "198.51.100.7")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
