// handlers/elevated/root/tenant/reactivate.rs - POST /api/root/tenant/:id/reactivate handler

use axum::{
    extract::{Path, State},
    Extension,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{AdminActor, ApiResponse, ApiResult};
use crate::tenancy::{TenantId, TenantStatus};

/// Lift a suspension. Deleted tenants cannot be reactivated (409).
pub async fn tenant_reactivate(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<TenantId>,
) -> ApiResult<TenantStatus> {
    let status = state
        .tenancy
        .lifecycle()
        .reactivate(id, &actor)
        .await
        .map_err(ApiError::from)?;
    Ok(ApiResponse::success(status))
}
