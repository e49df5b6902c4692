//! Tenant namespacing for shared key/value caches.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::IsolationError;
use crate::tenancy::audit::{AuditKind, AuditLog};
use crate::tenancy::context::ContextStore;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

/// Process-local backend with per-entry expiry
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (Value, Option<Instant>)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw keys as stored, expired entries included
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((_, Some(expires))) if *expires <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.lock().insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

/// Prefixes every key with the current tenant id (`{tenant_id}:{key}`).
///
/// Reads without a tenant are misses; writes without a tenant are refused.
/// An all-tenants exemption does not name a tenant, so it counts as no scope.
#[derive(Clone)]
pub struct NamespacedCache {
    backend: Arc<dyn CacheBackend>,
    audit: AuditLog,
}

impl NamespacedCache {
    pub fn new(backend: Arc<dyn CacheBackend>, audit: AuditLog) -> Self {
        Self { backend, audit }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, IsolationError> {
        let Some(ctx) = ContextStore::current_tenant() else {
            self.audit.emit(AuditKind::UnscopedOperation {
                surface: "cache",
                operation: "get".to_string(),
                target: key.to_string(),
                rejected: false,
            });
            return Ok(None);
        };
        Ok(self.backend.get(&namespaced(&ctx.tenant_id.to_string(), key)).await?)
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), IsolationError> {
        let tenant = self.require_tenant("set", key)?;
        Ok(self.backend.set(&namespaced(&tenant, key), value, ttl).await?)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, IsolationError> {
        let tenant = self.require_tenant("delete", key)?;
        Ok(self.backend.delete(&namespaced(&tenant, key)).await?)
    }

    fn require_tenant(&self, operation: &str, key: &str) -> Result<String, IsolationError> {
        ContextStore::require_tenant(operation, key)
            .map(|ctx| ctx.tenant_id.to_string())
            .inspect_err(|_| {
                self.audit.emit(AuditKind::UnscopedOperation {
                    surface: "cache",
                    operation: operation.to_string(),
                    target: key.to_string(),
                    rejected: true,
                });
            })
    }
}

fn namespaced(tenant: &str, key: &str) -> String {
    format!("{}:{}", tenant, key)
}
