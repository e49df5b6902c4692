// handlers/elevated/root/tenant/routing_keys.rs - POST|DELETE /api/root/tenant/:id/routing-keys handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{AdminActor, ApiResponse, ApiResult};
use crate::tenancy::{RoutingKey, TenantId, TenantStatus};

#[derive(Debug, Deserialize)]
pub struct RoutingKeyRequest {
    /// `kind:value`, e.g. `host:acme.example.com`
    pub key: String,
}

impl RoutingKeyRequest {
    fn parse(&self) -> Result<RoutingKey, ApiError> {
        Ok(self.key.parse::<RoutingKey>()?)
    }
}

pub async fn routing_key_add(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<TenantId>,
    Json(body): Json<RoutingKeyRequest>,
) -> ApiResult<TenantStatus> {
    let key = body.parse()?;
    let status = state
        .tenancy
        .lifecycle()
        .add_routing_key(id, key, &actor)
        .await
        .map_err(ApiError::from)?;
    Ok(ApiResponse::success(status))
}

pub async fn routing_key_remove(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    Path(id): Path<TenantId>,
    Json(body): Json<RoutingKeyRequest>,
) -> ApiResult<TenantStatus> {
    let key = body.parse()?;
    let status = state
        .tenancy
        .lifecycle()
        .remove_routing_key(id, &key, &actor)
        .await
        .map_err(ApiError::from)?;
    Ok(ApiResponse::success(status))
}
