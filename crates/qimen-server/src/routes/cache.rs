use axum::{Json, extract::State};
use qimen_cache::CacheStats;

use crate::server::AppState;

pub async fn stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.get_stats().await)
}
