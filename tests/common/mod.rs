#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;

use tenant_guard::app::{router, AppState};
use tenant_guard::auth::{generate_jwt, Claims};
use tenant_guard::config::TenancyConfig;
use tenant_guard::tenancy::{
    AuditLog, InMemoryRegistry, MemoryAuditSink, NewTenant, RoutingKey, StorageTarget, Tenancy, TenantId,
};

pub const JWT_SECRET: &str = "integration-test-secret";

/// Router served in-process on an unused port, with handles on its registry
/// and audit trail
pub struct TestServer {
    pub base_url: String,
    pub tenancy: Tenancy,
    pub registry: Arc<InMemoryRegistry>,
    pub audit: Arc<MemoryAuditSink>,
    pub client: reqwest::Client,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        Self::with_config(TenancyConfig::default()).await
    }

    pub async fn with_config(config: TenancyConfig) -> Result<Self> {
        let registry = Arc::new(InMemoryRegistry::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let tenancy = Tenancy::new(registry.clone(), AuditLog::with_sink(audit.clone()), config);
        let app = router(AppState::new(tenancy.clone(), JWT_SECRET));

        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            tenancy,
            registry,
            audit,
            client: reqwest::Client::new(),
        };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register an active tenant in the shared database with the given keys (`kind:value`)
    pub async fn create_tenant(&self, name: &str, keys: &[&str]) -> Result<TenantId> {
        self.create_tenant_in(name, keys, StorageTarget::new("shared")).await
    }

    pub async fn create_tenant_in(&self, name: &str, keys: &[&str], storage: StorageTarget) -> Result<TenantId> {
        let mut new = NewTenant::new(name, storage);
        for key in keys {
            new = new.routing_key(key.parse::<RoutingKey>()?);
        }
        Ok(self.tenancy.lifecycle().create_tenant(new, "test-admin").await?)
    }

    /// GET whoami with the tenant header set
    pub async fn whoami_header(&self, value: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(self.url("/api/tenant/whoami"))
            .header("x-tenant-id", value)
            .send()
            .await?)
    }
}

pub fn root_token() -> String {
    token(Claims::new("root-admin", "root", 1))
}

pub fn user_token(tenant_claim: Option<&str>) -> String {
    let claims = Claims::new("alice", "user", 1);
    match tenant_claim {
        Some(tenant) => token(claims.with_claim("tenant", tenant)),
        None => token(claims),
    }
}

fn token(claims: Claims) -> String {
    generate_jwt(&claims, JWT_SECRET).expect("sign test token")
}

/// Split a response into status and JSON body
pub async fn json(resp: reqwest::Response) -> Result<(StatusCode, Value)> {
    let status = resp.status();
    let body = resp.json::<Value>().await?;
    Ok((status, body))
}
