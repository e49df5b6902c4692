//! Wiring of the tenancy components, and entry points for work that does not
//! arrive as an HTTP request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::audit::AuditLog;
use super::cache::ResolutionCache;
use super::context::{ContextError, ContextOrigin, ContextStore, Scope};
use super::error::ResolveError;
use super::lifecycle::LifecycleController;
use super::model::{StorageTarget, TenantId};
use super::registry::TenantRegistry;
use super::resolver::Resolver;
use crate::config::TenancyConfig;
use crate::isolation::cache::{CacheBackend, NamespacedCache};
use crate::isolation::storage::{InMemoryStore, RecordStore, ScopedRepository, TenantScoped};
use crate::isolation::{ExemptionPolicy, IsolationError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Isolation(#[from] IsolationError),
}

/// Shared tenancy services. Cheap to clone.
#[derive(Clone)]
pub struct Tenancy {
    registry: Arc<dyn TenantRegistry>,
    cache: Arc<ResolutionCache>,
    resolver: Arc<Resolver>,
    lifecycle: Arc<LifecycleController>,
    audit: AuditLog,
    exemptions: ExemptionPolicy,
    records: Arc<dyn RecordStore>,
    shared_target: StorageTarget,
    config: Arc<TenancyConfig>,
}

impl Tenancy {
    pub fn new(registry: Arc<dyn TenantRegistry>, audit: AuditLog, config: TenancyConfig) -> Self {
        let cache = Arc::new(ResolutionCache::new(Duration::from_secs(config.cache_ttl_secs)));
        let resolver = Arc::new(Resolver::new(
            registry.clone(),
            cache.clone(),
            audit.clone(),
            config.resolver_settings(),
        ));
        let lifecycle = Arc::new(LifecycleController::new(
            registry.clone(),
            cache.clone(),
            audit.clone(),
            config.shared_database.clone(),
        ));

        Self {
            registry,
            cache,
            resolver,
            lifecycle,
            audit,
            exemptions: ExemptionPolicy::new(&config.exempt_operations),
            records: Arc::new(InMemoryStore::new()),
            shared_target: StorageTarget::new(config.shared_database.clone()),
            config: Arc::new(config),
        }
    }

    /// Replace the default in-memory record store
    pub fn with_record_store(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = records;
        self
    }

    pub fn registry(&self) -> &Arc<dyn TenantRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn exemptions(&self) -> &ExemptionPolicy {
        &self.exemptions
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Storage interceptor for `T` over the configured record store
    pub fn scoped<T: TenantScoped>(&self) -> ScopedRepository<T> {
        self.repository(self.records.clone())
    }

    /// Storage interceptor for `T` over `store`
    pub fn repository<T: TenantScoped>(&self, store: Arc<dyn RecordStore>) -> ScopedRepository<T> {
        ScopedRepository::new(store, self.audit.clone(), self.shared_target.clone())
    }

    pub fn namespaced_cache(&self, backend: Arc<dyn CacheBackend>) -> NamespacedCache {
        NamespacedCache::new(backend, self.audit.clone())
    }

    /// Run background work for one tenant.
    ///
    /// The tenant is looked up like a request would be (it must exist and be
    /// active) and `fut` runs with its context installed. Refused when the
    /// caller already has a scope, so a job cannot switch tenants midway.
    pub async fn run_as_tenant<F, T>(&self, tenant_id: TenantId, fut: F) -> Result<T, DispatchError>
    where
        F: Future<Output = T>,
    {
        if ContextStore::get().is_some() {
            return Err(ContextError::AlreadySet.into());
        }

        let resolved = self.resolver.resolve_id(tenant_id).await?;
        info!(tenant_id = %resolved.tenant_id, tenant = %resolved.tenant_name, "Running background work as tenant");
        let scope = Scope::tenant(resolved.context(ContextOrigin::Background));
        Ok(ContextStore::enter(scope, fut).await)
    }

    /// Run an allow-listed maintenance operation across all tenants
    pub async fn run_exempt<F, T>(&self, operation: &str, fut: F) -> Result<T, DispatchError>
    where
        F: Future<Output = T>,
    {
        if ContextStore::get().is_some() {
            return Err(ContextError::AlreadySet.into());
        }

        let exemption = self.exemptions.grant(operation)?;
        warn!(operation, "Running exempt operation across all tenants");
        Ok(ContextStore::enter(Scope::AllTenants(exemption), fut).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::model::NewTenant;
    use crate::tenancy::registry::InMemoryRegistry;
    use crate::tenancy::routing::RoutingKey;

    fn tenancy() -> (Tenancy, Arc<InMemoryRegistry>) {
        let registry = Arc::new(InMemoryRegistry::new());
        let config = TenancyConfig {
            exempt_operations: vec!["usage_report".to_string()],
            ..TenancyConfig::default()
        };
        (Tenancy::new(registry.clone(), AuditLog::new(), config), registry)
    }

    async fn create(t: &Tenancy, name: &str) -> TenantId {
        let new = NewTenant::new(name, StorageTarget::new("shared"))
            .routing_key(RoutingKey::header(&name.to_lowercase()).unwrap());
        t.lifecycle().create_tenant(new, "root").await.unwrap()
    }

    #[tokio::test]
    async fn run_as_tenant_installs_background_context() {
        let (t, _) = tenancy();
        let id = create(&t, "Acme").await;

        let seen = t
            .run_as_tenant(id, async { ContextStore::current_tenant() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen.tenant_id, id);
        assert_eq!(seen.origin, ContextOrigin::Background);
        assert!(ContextStore::get().is_none());
    }

    #[tokio::test]
    async fn run_as_tenant_refuses_inactive_and_unknown() {
        let (t, _) = tenancy();
        let id = create(&t, "Acme").await;
        t.lifecycle().suspend(id, "billing", "root").await.unwrap();

        assert!(matches!(
            t.run_as_tenant(id, async {}).await,
            Err(DispatchError::Resolve(ResolveError::TenantSuspended(s))) if s == id
        ));
        assert!(matches!(
            t.run_as_tenant(TenantId::new(), async {}).await,
            Err(DispatchError::Resolve(ResolveError::TenantNotFound))
        ));
    }

    #[tokio::test]
    async fn nested_dispatch_is_refused() {
        let (t, _) = tenancy();
        let (a, b) = (create(&t, "Acme").await, create(&t, "Globex").await);

        let inner = t
            .run_as_tenant(a, async { t.run_as_tenant(b, async {}).await.is_err() })
            .await
            .unwrap();
        assert!(inner);
    }

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Note {
        id: String,
        tenant_id: Option<TenantId>,
    }

    impl TenantScoped for Note {
        const ENTITY: &'static str = "notes";

        fn id(&self) -> String {
            self.id.clone()
        }

        fn tenant_id(&self) -> Option<TenantId> {
            self.tenant_id
        }

        fn set_tenant_id(&mut self, tenant_id: TenantId) {
            self.tenant_id = Some(tenant_id);
        }
    }

    #[tokio::test]
    async fn scoped_repositories_share_the_configured_store() {
        let (t, _) = tenancy();
        let store = Arc::new(InMemoryStore::new());
        let t = t.with_record_store(store.clone());
        let id = create(&t, "Acme").await;

        let note = Note { id: "n1".to_string(), tenant_id: None };
        t.run_as_tenant(id, t.scoped::<Note>().create(note)).await.unwrap().unwrap();
        assert_eq!(store.len(&StorageTarget::new("shared"), "notes"), 1);
    }

    #[tokio::test]
    async fn run_exempt_checks_allow_list() {
        let (t, _) = tenancy();
        let scope = t.run_exempt("usage_report", async { ContextStore::get() }).await.unwrap();
        assert!(matches!(scope, Some(Scope::AllTenants(e)) if e.operation() == "usage_report"));

        assert!(matches!(
            t.run_exempt("drop_all", async {}).await,
            Err(DispatchError::Isolation(IsolationError::ExemptionDenied(_)))
        ));
    }
}
