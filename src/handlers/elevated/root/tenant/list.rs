// handlers/elevated/root/tenant/list.rs - GET /api/root/tenant handler

use axum::extract::{Query, State};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::{LifecycleState, TenantStatus};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Only tenants in this state, e.g. `?state=suspended`
    pub state: Option<LifecycleState>,
}

pub async fn tenant_list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Vec<TenantStatus>> {
    let mut tenants = state.tenancy.lifecycle().list().await.map_err(ApiError::from)?;
    if let Some(wanted) = query.state {
        tenants.retain(|t| t.state == wanted);
    }
    tenants.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ApiResponse::success(tenants))
}
