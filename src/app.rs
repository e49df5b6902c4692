use axum::{
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::handlers;
use crate::middleware::{jwt_auth_middleware, require_root_middleware, resolve_tenant_middleware};
use crate::tenancy::Tenancy;

/// State shared by every handler and middleware
#[derive(Clone)]
pub struct AppState {
    pub tenancy: Tenancy,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(tenancy: Tenancy, jwt_secret: impl Into<Arc<str>>) -> Self {
        Self { tenancy, jwt_secret: jwt_secret.into() }
    }
}

/// Full application: routes plus CORS, request timeout and tracing
pub fn app(state: AppState, config: &AppConfig) -> Router {
    router(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.api.request_timeout_secs)))
        .layer(cors_layer(&config.security.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Routes and auth middleware without the outer HTTP layers
pub fn router(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(handlers::health::health))
        // Tenant-scoped API (tenant resolved per request)
        .merge(tenant_routes(&state))
        // Root-only tenant administration
        .merge(root_routes())
        // Token is optional globally; tiers decide what they require
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware))
        .with_state(state)
}

fn tenant_routes(state: &AppState) -> Router<AppState> {
    use handlers::tenant;

    Router::new()
        .route("/api/tenant/whoami", get(tenant::whoami_get))
        // Path strategy: /t/:tenant/... carries the tenant as the first segment
        .route("/t/:tenant/api/tenant/whoami", get(tenant::whoami_get))
        .route_layer(from_fn_with_state(state.clone(), resolve_tenant_middleware))
}

fn root_routes() -> Router<AppState> {
    use handlers::elevated::root::tenant;

    Router::new()
        .route("/api/root/tenant", get(tenant::tenant_list).post(tenant::tenant_create))
        .route(
            "/api/root/tenant/:id",
            get(tenant::tenant_show)
                .patch(tenant::tenant_update)
                .delete(tenant::tenant_delete),
        )
        .route("/api/root/tenant/:id/suspend", post(tenant::tenant_suspend))
        .route("/api/root/tenant/:id/reactivate", post(tenant::tenant_reactivate))
        .route(
            "/api/root/tenant/:id/routing-keys",
            post(tenant::routing_key_add).delete(tenant::routing_key_remove),
        )
        .route("/api/root/tenant/:id/storage", put(tenant::tenant_move_storage))
        .route_layer(from_fn(require_root_middleware))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Tenant Guard",
            "version": version,
            "description": "Multi-tenant request isolation service",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "tenant": "/api/tenant/whoami, /t/:tenant/api/tenant/whoami (tenant resolved by host, path, header or claim)",
                "root": "/api/root/tenant[/:id] (restricted, requires root token)",
            }
        }
    }))
}
