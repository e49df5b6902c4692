// handlers/elevated/root/tenant/storage.rs - PUT /api/root/tenant/:id/storage handler

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{AdminActor, ApiResponse, ApiResult};
use crate::tenancy::{StorageTarget, TenantId, TenantStatus};

/// Point the tenant at a different database/schema. Data is not copied.
pub async fn tenant_move_storage(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<TenantId>,
    Json(target): Json<StorageTarget>,
) -> ApiResult<TenantStatus> {
    let status = state
        .tenancy
        .lifecycle()
        .move_storage(id, target, &actor)
        .await
        .map_err(ApiError::from)?;
    Ok(ApiResponse::success(status))
}
