use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{RegistryError, TenantRegistry};
use crate::tenancy::model::{NewTenant, Tenant, TenantId};
use crate::tenancy::routing::RoutingKey;

#[derive(Default)]
struct Inner {
    tenants: HashMap<TenantId, Tenant>,
    routes: HashMap<RoutingKey, TenantId>,
}

/// Registry held in process memory. Used for development, seeded
/// deployments and tests; `set_available(false)` simulates an outage.
pub struct InMemoryRegistry {
    inner: RwLock<Inner>,
    available: AtomicBool,
    lookups: AtomicU64,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            available: AtomicBool::new(true),
            lookups: AtomicU64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of lookups served (get and find_by_routing_key)
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), RegistryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RegistryError::Unavailable("in-memory registry marked unavailable".to_string()))
        }
    }
}

#[async_trait]
impl TenantRegistry for InMemoryRegistry {
    async fn insert(&self, new: NewTenant) -> Result<Tenant, RegistryError> {
        self.check_available()?;
        let tenant = Tenant::from_new(new);

        let mut inner = self.inner.write();
        if inner.tenants.contains_key(&tenant.id) {
            return Err(RegistryError::AlreadyExists(tenant.id));
        }
        if let Some(key) = tenant.routing_keys.iter().find(|k| inner.routes.contains_key(*k)) {
            return Err(RegistryError::RoutingKeyTaken(key.clone()));
        }
        for key in &tenant.routing_keys {
            inner.routes.insert(key.clone(), tenant.id);
        }
        inner.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn get(&self, id: TenantId) -> Result<Option<Tenant>, RegistryError> {
        self.check_available()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.read().tenants.get(&id).cloned())
    }

    async fn find_by_routing_key(&self, key: &RoutingKey) -> Result<Option<Tenant>, RegistryError> {
        self.check_available()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.read();
        Ok(inner
            .routes
            .get(key)
            .and_then(|id| inner.tenants.get(id))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Tenant>, RegistryError> {
        self.check_available()?;
        let mut tenants: Vec<Tenant> = self.inner.read().tenants.values().cloned().collect();
        tenants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(tenants)
    }

    async fn save(&self, tenant: &Tenant) -> Result<Tenant, RegistryError> {
        self.check_available()?;
        let mut inner = self.inner.write();

        let stored_version = inner
            .tenants
            .get(&tenant.id)
            .map(|t| t.version)
            .ok_or(RegistryError::NotFound(tenant.id))?;
        if stored_version != tenant.version {
            return Err(RegistryError::VersionConflict { id: tenant.id, expected: tenant.version });
        }
        if let Some(key) = tenant
            .routing_keys
            .iter()
            .find(|k| inner.routes.get(*k).is_some_and(|owner| *owner != tenant.id))
        {
            return Err(RegistryError::RoutingKeyTaken(key.clone()));
        }

        inner.routes.retain(|_, owner| *owner != tenant.id);
        for key in &tenant.routing_keys {
            inner.routes.insert(key.clone(), tenant.id);
        }

        let mut stored = tenant.clone();
        stored.version += 1;
        stored.updated_at = Utc::now();
        inner.tenants.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        self.check_available()
    }
}
