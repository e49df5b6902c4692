// handlers/elevated/root/tenant/delete.rs - DELETE /api/root/tenant/:id handler

use axum::{
    extract::{Path, State},
    Extension,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{AdminActor, ApiResponse, ApiResult};
use crate::tenancy::{TenantId, TenantStatus};

/// Soft delete: the tenant stops resolving, its record and routing keys stay reserved
pub async fn tenant_delete(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<TenantId>,
) -> ApiResult<TenantStatus> {
    let status = state.tenancy.lifecycle().delete(id, &actor).await.map_err(ApiError::from)?;
    Ok(ApiResponse::success(status))
}
