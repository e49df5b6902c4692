// handlers/tenant/whoami.rs - GET /api/tenant/whoami handler

use axum::Extension;
use serde::Serialize;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::{ContextOrigin, ContextStore, ResolutionSource, ResolvedTenant, StorageTarget, TenantId};

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub tenant_id: TenantId,
    pub tenant_name: String,
    pub storage_target: StorageTarget,
    pub source: ResolutionSource,
    pub origin: ContextOrigin,
    pub request_id: String,
    pub cached: bool,
}

/// The tenant this request resolved to, read back from the context store
pub async fn whoami_get(Extension(resolved): Extension<ResolvedTenant>) -> ApiResult<WhoAmI> {
    let ctx = ContextStore::require_tenant("whoami", "tenant").map_err(ApiError::from)?;

    Ok(ApiResponse::success(WhoAmI {
        tenant_id: ctx.tenant_id,
        tenant_name: ctx.tenant_name.clone(),
        storage_target: ctx.storage_target.clone(),
        source: resolved.source,
        origin: ctx.origin,
        request_id: ctx.request_id.clone(),
        cached: resolved.cached,
    }))
}
