use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::AppConfig,
    middleware::{self as app_middleware, RateLimitState},
    routes,
};
use qimen_cache::CacheService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(cache: CacheService, config: AppConfig) -> Self {
        Self {
            cache,
            config: Arc::new(config),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let rate_limit = RateLimitState {
        cache: state.cache.clone(),
        config: state.config.rate_limit.clone(),
    };

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/cache/stats", get(routes::cache::stats))
        .route("/metrics", get(routes::metrics::prometheus))
        .with_state(state)
        // Middleware stack (outermost last: request id -> trace -> cors/compression -> metrics -> rate limit)
        .layer(middleware::from_fn_with_state(
            rate_limit,
            app_middleware::rate_limit,
        ))
        .layer(middleware::from_fn(app_middleware::http_metrics))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct QimenServer {
    addr: SocketAddr,
    app: Router,
}

impl QimenServer {
    /// Select the cache backing store and assemble the router.
    pub async fn from_config(cfg: AppConfig) -> Self {
        let cache = CacheService::connect(&cfg.redis, &cfg.cache, cfg.environment).await;
        tracing::info!(mode = %cache.mode(), "Cache service ready");
        Self::with_cache(cache, cfg)
    }

    pub fn with_cache(cache: CacheService, cfg: AppConfig) -> Self {
        let addr = cfg.addr();
        let app = build_app(AppState::new(cache, cfg));
        Self { addr, app }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
