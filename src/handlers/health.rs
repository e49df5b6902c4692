// handlers/health.rs - GET /health handler

use axum::extract::State;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

/// Liveness plus registry reachability. 503 with `REGISTRY_UNAVAILABLE`
/// when the registry cannot be reached.
pub async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    state.tenancy.registry().ping().await.map_err(ApiError::from)?;

    Ok(ApiResponse::success(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "registry": "ok",
        "resolution_cache": state.tenancy.cache().stats(),
    })))
}
