use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::app::AppState;
use crate::auth::Claims;
use crate::error::ApiError;
use crate::tenancy::{AddressingInfo, ContextOrigin, ContextStore, Scope};

/// Routes mounted under this prefix carry the tenant as their first path segment
pub const TENANT_PATH_PREFIX: &str = "/t/";

/// Resolves the tenant for the request and runs the rest of the stack inside
/// its context scope. The scope is dropped with the handler future, so
/// nothing tenant-specific outlives the request.
pub async fn resolve_tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let tenancy = &state.tenancy;
    let info = addressing_info(
        request.headers(),
        request.uri(),
        request.extensions().get::<Claims>(),
        &tenancy.config().header_name,
        &tenancy.config().claim_name,
    );

    let resolved = tenancy.resolver().resolve(&info).await?;

    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let ctx = resolved.context(ContextOrigin::Request).with_request_id(request_id.clone());

    let span = tracing::info_span!(
        "tenant",
        tenant_id = %resolved.tenant_id,
        tenant = %resolved.tenant_name,
        request_id = %request_id
    );
    request.extensions_mut().insert(resolved);

    Ok(ContextStore::enter(Scope::tenant(ctx), next.run(request))
        .instrument(span)
        .await)
}

fn addressing_info(
    headers: &HeaderMap,
    uri: &Uri,
    claims: Option<&Claims>,
    header_name: &str,
    claim_name: &str,
) -> AddressingInfo {
    let header_value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

    // HTTP/2 carries the host as the :authority pseudo-header, surfaced in the URI
    let host = header_value(header::HOST.as_str())
        .map(|host| strip_port(&host).to_string())
        .or_else(|| uri.host().map(str::to_string));

    AddressingInfo {
        host,
        path: uri.path().strip_prefix(TENANT_PATH_PREFIX).map(str::to_string),
        header: header_value(header_name),
        claim: claims.and_then(|c| c.claim(claim_name)).map(str::to_string),
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals never name a tenant; leave them for the host key to reject
    if host.starts_with('[') {
        return host;
    }
    host.split(':').next().unwrap_or(host)
}
