use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::config::RateLimitConfig;
use crate::metrics;
use qimen_cache::CacheService;

/// Paths that are never rate limited.
const EXEMPT_PATHS: &[&str] = &["/health", "/metrics"];

// Middleware that ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    // If the incoming request already has a request-id, preserve it; otherwise generate one
    let req_id_value = req.headers().get(&header_name).cloned().unwrap_or_else(|| {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
    });

    // Add to request extensions for downstream usage (e.g., logging)
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

// Records request count and latency
pub async fn http_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let started = Instant::now();
    let res = next.run(req).await;
    metrics::record_http_request(&method, res.status().as_u16(), started.elapsed());
    res
}

#[derive(Clone)]
pub struct RateLimitState {
    pub cache: CacheService,
    pub config: RateLimitConfig,
}

/// Per-client request limiting backed by the cache.
///
/// Counts requests under `{prefix}:{client}` with [`CacheService::incr`].
/// When the cache degrades (`incr` returns 0) requests are let through.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.enabled || EXEMPT_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let client = client_id(&req);
    let key = format!("{}:{}", state.config.key_prefix, client);
    let count = state.cache.incr(&key, Some(state.config.window())).await;
    let limit = i64::from(state.config.max_requests);

    if count > limit {
        tracing::warn!(client = %client, count, limit, "rate limit exceeded");
        metrics::record_rate_limited();
        return too_many_requests(&state.config);
    }

    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(limit),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from((limit - count).max(0)),
    );
    res
}

/// Identify the caller: first `x-forwarded-for` hop, then the peer address.
pub fn client_id(req: &Request<Body>) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn too_many_requests(config: &RateLimitConfig) -> Response {
    let body = Json(json!({
        "error": "Too many requests, please try again later."
    }));
    let mut res = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    res.headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(config.window_secs));
    res
}
