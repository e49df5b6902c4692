// handlers/elevated/root/tenant/update.rs - PATCH /api/root/tenant/:id handler

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{AdminActor, ApiResponse, ApiResult};
use crate::tenancy::{TenantId, TenantStatus};

#[derive(Debug, Deserialize)]
pub struct UpdateTenantRequest {
    pub name: String,
}

/// Rename a tenant
pub async fn tenant_update(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<TenantId>,
    Json(body): Json<UpdateTenantRequest>,
) -> ApiResult<TenantStatus> {
    let status = state
        .tenancy
        .lifecycle()
        .rename(id, &body.name, &actor)
        .await
        .map_err(ApiError::from)?;
    Ok(ApiResponse::success(status))
}
