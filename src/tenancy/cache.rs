//! Resolution cache.
//!
//! Maps routing keys (and tenant ids) to a small projection of the tenant
//! record so the resolver does not hit the registry on every request.
//!
//! Invalidation is atomic with respect to administrative mutations:
//!
//! - [`ResolutionCache::begin_mutation`] marks the tenant as pending and bumps
//!   the cache generation. While pending, readers treat the tenant's entries
//!   as misses and inserts for the tenant are refused.
//! - Dropping the returned [`MutationGuard`] purges every entry of the tenant
//!   (including entries keyed by routing keys it no longer owns) and bumps the
//!   generation again.
//! - Resolver inserts carry the [`CacheTicket`] taken before the registry read
//!   and are refused if the generation moved in between.
//!
//! Once the registry shows the new state and the guard is gone, no reader can
//! observe the previous state through the cache.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::model::{LifecycleState, StorageTarget, Tenant, TenantId};
use super::routing::RoutingKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Route(RoutingKey),
    Id(TenantId),
}

#[derive(Debug, Clone)]
pub struct CachedTenant {
    pub tenant_id: TenantId,
    pub tenant_name: String,
    pub state: LifecycleState,
    pub storage_target: StorageTarget,
    pub inserted_at: Instant,
}

impl From<&Tenant> for CachedTenant {
    fn from(t: &Tenant) -> Self {
        Self {
            tenant_id: t.id,
            tenant_name: t.name.clone(),
            state: t.state,
            storage_target: t.storage_target.clone(),
            inserted_at: Instant::now(),
        }
    }
}

/// Generation observed before a registry read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, CachedTenant>,
    by_tenant: HashMap<TenantId, HashSet<CacheKey>>,
    pending: HashMap<TenantId, usize>,
}

impl Inner {
    fn purge_tenant(&mut self, tenant_id: TenantId) -> usize {
        match self.by_tenant.remove(&tenant_id) {
            Some(keys) => {
                for key in &keys {
                    self.entries.remove(key);
                }
                keys.len()
            }
            None => 0,
        }
    }
}

pub struct ResolutionCache {
    ttl: Duration,
    inner: RwLock<Inner>,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolutionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(Inner::default()),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedTenant> {
        let inner = self.inner.read();
        let found = inner.entries.get(key).filter(|entry| {
            entry.inserted_at.elapsed() < self.ttl && !inner.pending.contains_key(&entry.tenant_id)
        });

        match found {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn ticket(&self) -> CacheTicket {
        CacheTicket(self.generation.load(Ordering::SeqCst))
    }

    /// Store `value` unless a mutation started since `ticket` was taken or is
    /// still in progress for the tenant. Returns whether the entry was stored.
    pub fn insert(&self, key: CacheKey, value: CachedTenant, ticket: CacheTicket) -> bool {
        if self.ttl.is_zero() {
            return false;
        }

        let mut inner = self.inner.write();
        if self.generation.load(Ordering::SeqCst) != ticket.0 || inner.pending.contains_key(&value.tenant_id) {
            return false;
        }

        let previous_owner = inner.entries.get(&key).map(|previous| previous.tenant_id);
        if let Some(owner) = previous_owner.filter(|owner| *owner != value.tenant_id) {
            if let Some(keys) = inner.by_tenant.get_mut(&owner) {
                keys.remove(&key);
            }
        }
        inner
            .by_tenant
            .entry(value.tenant_id)
            .or_default()
            .insert(key.clone());
        inner.entries.insert(key, value);
        true
    }

    /// Mark `tenant_id` as being mutated until the returned guard is dropped
    pub fn begin_mutation(&self, tenant_id: TenantId) -> MutationGuard<'_> {
        let mut inner = self.inner.write();
        *inner.pending.entry(tenant_id).or_insert(0) += 1;
        self.generation.fetch_add(1, Ordering::SeqCst);
        MutationGuard { cache: self, tenant_id }
    }

    /// Drop expired entries. Called periodically by the sweeper task.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.write();
        let ttl = self.ttl;
        let expired: Vec<(CacheKey, TenantId)> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= ttl)
            .map(|(key, entry)| (key.clone(), entry.tenant_id))
            .collect();

        for (key, tenant_id) in &expired {
            inner.entries.remove(key);
            if let Some(keys) = inner.by_tenant.get_mut(tenant_id) {
                keys.remove(key);
                if keys.is_empty() {
                    inner.by_tenant.remove(tenant_id);
                }
            }
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.inner.read().entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn finish_mutation(&self, tenant_id: TenantId) {
        let mut inner = self.inner.write();
        let purged = inner.purge_tenant(tenant_id);
        self.generation.fetch_add(1, Ordering::SeqCst);

        let done = match inner.pending.get_mut(&tenant_id) {
            Some(count) => {
                *count -= 1;
                *count == 0
            }
            None => false,
        };
        if done {
            inner.pending.remove(&tenant_id);
        }
        tracing::debug!("Resolution cache purged {} entries for tenant {}", purged, tenant_id);
    }
}

/// Keeps a tenant's cache entries invisible until dropped, then purges them
#[must_use = "the tenant is only protected while the guard is alive"]
pub struct MutationGuard<'a> {
    cache: &'a ResolutionCache,
    tenant_id: TenantId,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        self.cache.finish_mutation(self.tenant_id);
    }
}
