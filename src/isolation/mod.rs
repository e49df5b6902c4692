//! Enforcement points that keep one tenant's work away from another's data:
//! the storage interceptor ([`storage::ScopedRepository`]) and the cache
//! namespacer ([`cache::NamespacedCache`]).

pub mod cache;
pub mod exemption;
pub mod storage;

use thiserror::Error;

use crate::tenancy::TenantId;

pub use cache::{CacheBackend, CacheError, InMemoryCache, NamespacedCache};
pub use exemption::{Exemption, ExemptionPolicy};
pub use storage::{InMemoryStore, PgRecordStore, RecordStore, ScopedRepository, StorageError, TenantScoped};

#[derive(Debug, Error)]
pub enum IsolationError {
    /// A tenant-scoped operation ran with no tenant context
    #[error("operation '{operation}' on '{target}' requires a tenant context")]
    Unscoped { operation: String, target: String },

    #[error("cross-tenant {operation} blocked on {entity}")]
    CrossTenantViolation {
        entity: String,
        id: Option<String>,
        operation: String,
        context_tenant: TenantId,
        owner_tenant: Option<TenantId>,
    },

    #[error("operation '{0}' is not exempt from tenant scoping")]
    ExemptionDenied(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl IsolationError {
    pub fn unscoped(operation: impl Into<String>, target: impl Into<String>) -> Self {
        IsolationError::Unscoped {
            operation: operation.into(),
            target: target.into(),
        }
    }
}
