// handlers/elevated/root/tenant/suspend.rs - POST /api/root/tenant/:id/suspend handler

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{AdminActor, ApiResponse, ApiResult};
use crate::tenancy::{TenantId, TenantStatus};

#[derive(Debug, Default, Deserialize)]
pub struct SuspendRequest {
    #[serde(default)]
    pub reason: String,
}

pub async fn tenant_suspend(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<TenantId>,
    body: Option<Json<SuspendRequest>>,
) -> ApiResult<TenantStatus> {
    let Json(body) = body.unwrap_or_default();
    let status = state
        .tenancy
        .lifecycle()
        .suspend(id, &body.reason, &actor)
        .await
        .map_err(ApiError::from)?;
    Ok(ApiResponse::success(status))
}
