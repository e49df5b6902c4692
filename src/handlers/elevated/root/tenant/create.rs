// handlers/elevated/root/tenant/create.rs - POST /api/root/tenant handler

use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{AdminActor, ApiResponse, ApiResult};
use crate::tenancy::{NewTenant, RoutingKey, StorageTarget, TenantId, TenantStatus};

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    #[serde(default)]
    pub id: Option<TenantId>,
    pub name: String,
    pub routing_keys: Vec<RoutingKey>,
    pub storage: StorageTarget,
}

pub async fn tenant_create(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Json(body): Json<CreateTenantRequest>,
) -> ApiResult<TenantStatus> {
    let lifecycle = state.tenancy.lifecycle();
    let new = NewTenant {
        id: body.id,
        name: body.name,
        routing_keys: body.routing_keys,
        storage_target: body.storage,
    };

    let id = lifecycle.create_tenant(new, &actor).await.map_err(ApiError::from)?;
    let status = lifecycle.status(id).await.map_err(ApiError::from)?;
    Ok(ApiResponse::created(status))
}
