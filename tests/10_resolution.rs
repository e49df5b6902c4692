mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use tower::ServiceExt;

use common::{json, user_token, TestServer, JWT_SECRET};
use tenant_guard::app::{router, AppState};
use tenant_guard::config::TenancyConfig;
use tenant_guard::tenancy::{AuditKind, NewTenant, ResolutionOutcome, RoutingKey, StorageTarget, TenantId};

#[tokio::test]
async fn resolves_each_strategy() -> Result<()> {
    let server = TestServer::start().await?;
    let acme = server
        .create_tenant("Acme", &["host:acme.example.com", "path:acme", "header:acme", "claim:acme-corp"])
        .await?;

    // host
    let resp = server
        .client
        .get(server.url("/api/tenant/whoami"))
        .header("host", "ACME.example.com:8080")
        .send()
        .await?;
    let (status, body) = json(resp).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["tenant_id"], json!(acme.to_string()));
    assert_eq!(body["data"]["source"], json!({"type": "strategy", "strategy": "host"}));

    // path prefix
    let (status, body) = json(server.client.get(server.url("/t/acme/api/tenant/whoami")).send().await?).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["source"]["strategy"], "path_prefix");

    // header
    let (status, body) = json(server.whoami_header("acme").await?).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["tenant_name"], "Acme");
    assert_eq!(body["data"]["source"]["strategy"], "header");
    assert_eq!(body["data"]["origin"], "request");

    // claim
    let resp = server
        .client
        .get(server.url("/api/tenant/whoami"))
        .bearer_auth(user_token(Some("acme-corp")))
        .send()
        .await?;
    let (status, body) = json(resp).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["source"]["strategy"], "claim");
    Ok(())
}

#[tokio::test]
async fn earlier_strategy_wins() -> Result<()> {
    let server = TestServer::start().await?;
    let acme = server.create_tenant("Acme", &["host:acme.example.com"]).await?;
    server.create_tenant("Globex", &["header:globex"]).await?;

    let resp = server
        .client
        .get(server.url("/api/tenant/whoami"))
        .header("host", "acme.example.com")
        .header("x-tenant-id", "globex")
        .send()
        .await?;
    let (status, body) = json(resp).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tenant_id"], json!(acme.to_string()));
    Ok(())
}

#[tokio::test]
async fn unmatched_key_falls_through_to_next_strategy() -> Result<()> {
    let server = TestServer::start().await?;
    let globex = server.create_tenant("Globex", &["header:globex"]).await?;

    // Unknown host, then a malformed path segment, then a matching header
    let resp = server
        .client
        .get(server.url("/t/-bad/api/tenant/whoami"))
        .header("host", "nobody.example.com")
        .header("x-tenant-id", "globex")
        .send()
        .await?;
    let (status, body) = json(resp).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["tenant_id"], json!(globex.to_string()));

    let outcomes = server.audit.resolution_outcomes();
    assert!(outcomes.contains(&ResolutionOutcome::NotFound));
    assert!(outcomes.contains(&ResolutionOutcome::InvalidKey));
    assert_eq!(outcomes.last(), Some(&ResolutionOutcome::RegistryHit));
    Ok(())
}

#[tokio::test]
async fn strict_mode_rejects_unknown_tenants() -> Result<()> {
    let server = TestServer::start().await?;
    server.create_tenant("Acme", &["header:acme"]).await?;

    let (status, body) = json(server.whoami_header("initech").await?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TENANT_NOT_FOUND");

    let (status, body) = json(server.client.get(server.url("/api/tenant/whoami")).send().await?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TENANT_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn lenient_mode_falls_back_to_default_tenant() -> Result<()> {
    let default = TenantId::new();
    let server = TestServer::with_config(TenancyConfig {
        strict_mode: false,
        default_tenant: Some(default),
        ..TenancyConfig::default()
    })
    .await?;

    let new = NewTenant::new("Default", StorageTarget::new("shared"))
        .with_id(default)
        .routing_key(RoutingKey::header("default")?);
    server.tenancy.lifecycle().create_tenant(new, "test-admin").await?;

    let (status, body) = json(server.whoami_header("initech").await?).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["tenant_id"], json!(default.to_string()));
    assert_eq!(body["data"]["source"], json!({"type": "default"}));
    assert!(server.audit.resolution_outcomes().contains(&ResolutionOutcome::DefaultFallback));
    Ok(())
}

#[tokio::test]
async fn suspended_is_gone_and_deleted_is_not_found() -> Result<()> {
    let server = TestServer::start().await?;
    let acme = server.create_tenant("Acme", &["header:acme"]).await?;
    let globex = server.create_tenant("Globex", &["header:globex"]).await?;

    server.tenancy.lifecycle().suspend(acme, "billing", "test-admin").await?;
    server.tenancy.lifecycle().delete(globex, "test-admin").await?;

    let (status, body) = json(server.whoami_header("acme").await?).await?;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "TENANT_SUSPENDED");

    let (status, body) = json(server.whoami_header("globex").await?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TENANT_NOT_FOUND");

    let outcomes = server.audit.resolution_outcomes();
    assert!(outcomes.contains(&ResolutionOutcome::Suspended));
    assert!(outcomes.contains(&ResolutionOutcome::Deleted));
    Ok(())
}

#[tokio::test]
async fn registry_outage_is_retryable() -> Result<()> {
    let server = TestServer::start().await?;
    server.create_tenant("Acme", &["header:acme"]).await?;
    server.registry.set_available(false);

    let resp = server.whoami_header("acme").await?;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        resp.headers().get("retry-after").and_then(|v| v.to_str().ok()),
        Some("5")
    );
    let body = resp.json::<serde_json::Value>().await?;
    assert_eq!(body["code"], "REGISTRY_UNAVAILABLE");

    let (status, _) = json(server.client.get(server.url("/health")).send().await?).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    server.registry.set_available(true);
    assert_eq!(server.whoami_header("acme").await?.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn repeat_lookups_are_served_from_cache() -> Result<()> {
    let server = TestServer::start().await?;
    server.create_tenant("Acme", &["header:acme"]).await?;

    let (_, first) = json(server.whoami_header("acme").await?).await?;
    let lookups = server.registry.lookups();
    let (_, second) = json(server.whoami_header("acme").await?).await?;

    assert_eq!(first["data"]["cached"], false);
    assert_eq!(second["data"]["cached"], true);
    assert_eq!(server.registry.lookups(), lookups);
    assert_eq!(
        server.audit.count(|k| matches!(k, AuditKind::Resolution { outcome: ResolutionOutcome::CacheHit, .. })),
        1
    );
    Ok(())
}

#[tokio::test]
async fn request_id_is_propagated() -> Result<()> {
    let server = TestServer::start().await?;
    server.create_tenant("Acme", &["header:acme"]).await?;

    let resp = server
        .client
        .get(server.url("/api/tenant/whoami"))
        .header("x-tenant-id", "acme")
        .header("x-request-id", "req-123")
        .send()
        .await?;
    let (_, body) = json(resp).await?;
    assert_eq!(body["data"]["request_id"], "req-123");

    let (_, body) = json(server.whoami_header("acme").await?).await?;
    let generated = body["data"]["request_id"].as_str().unwrap_or_default();
    assert!(!generated.is_empty() && generated != "req-123");
    Ok(())
}

#[tokio::test]
async fn host_strategy_reads_uri_authority_without_host_header() -> Result<()> {
    let server = TestServer::start().await?;
    let globex = server.create_tenant("Globex", &["host:globex.example.com"]).await?;

    // HTTP/2 requests carry :authority in the URI instead of a Host header
    let request = Request::builder()
        .uri("https://globex.example.com:8443/api/tenant/whoami")
        .body(Body::empty())?;
    let response = router(AppState::new(server.tenancy.clone(), JWT_SECRET))
        .oneshot(request)
        .await?;
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["data"]["tenant_id"], json!(globex.to_string()));
    assert_eq!(body["data"]["source"]["strategy"], "host");
    Ok(())
}
