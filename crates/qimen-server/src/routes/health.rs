use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use qimen_cache::BackingMode;
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cache: BackingMode,
    pub distributed_available: bool,
}

/// Always 200: the cache degrades instead of failing, so a fallback
/// instance is still healthy.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = HealthResponse {
        status: "ok",
        cache: state.cache.mode(),
        distributed_available: state.cache.is_distributed_available().await,
    };
    (StatusCode::OK, Json(body))
}
