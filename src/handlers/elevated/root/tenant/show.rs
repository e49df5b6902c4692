// handlers/elevated/root/tenant/show.rs - GET /api/root/tenant/:id handler

use axum::extract::{Path, State};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::{TenantId, TenantStatus};

pub async fn tenant_show(State(state): State<AppState>, Path(id): Path<TenantId>) -> ApiResult<TenantStatus> {
    let status = state.tenancy.lifecycle().status(id).await.map_err(ApiError::from)?;
    Ok(ApiResponse::success(status))
}
