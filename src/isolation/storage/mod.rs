//! Tenant-scoped persistence.
//!
//! [`RecordStore`] is the raw backend: it reads and writes JSON rows in a
//! [`StorageTarget`] and knows nothing about tenants. [`ScopedRepository`]
//! wraps it for one [`TenantScoped`] entity and applies the current
//! [`Scope`] to every call.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgRecordStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

use super::IsolationError;
use crate::database::DatabaseError;
use crate::filter::{FilterData, FilterError};
use crate::tenancy::audit::{AuditKind, AuditLog};
use crate::tenancy::context::{ContextStore, Scope, TenantContext};
use crate::tenancy::{StorageTarget, TenantId};

/// Primary key column every stored entity carries
pub const ID_FIELD: &str = "id";

/// Implemented by every entity whose rows belong to exactly one tenant
pub trait TenantScoped: Serialize + DeserializeOwned + Send + Sync {
    /// Table (or collection) name
    const ENTITY: &'static str;
    const SCOPE_FIELD: &'static str = "tenant_id";

    fn id(&self) -> String;
    fn tenant_id(&self) -> Option<TenantId>;
    fn set_tenant_id(&mut self, tenant_id: TenantId);
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, target: &StorageTarget, entity: &str, query: &FilterData) -> Result<Vec<Value>, StorageError>;

    async fn count(&self, target: &StorageTarget, entity: &str, where_clause: &Value) -> Result<u64, StorageError>;

    /// Insert one row and return it as stored
    async fn insert(&self, target: &StorageTarget, entity: &str, row: Value) -> Result<Value, StorageError>;

    /// Overwrite the fields present in `changes` on every row matching `where_clause`
    async fn update(
        &self,
        target: &StorageTarget,
        entity: &str,
        changes: Value,
        where_clause: &Value,
    ) -> Result<u64, StorageError>;

    async fn delete(&self, target: &StorageTarget, entity: &str, where_clause: &Value) -> Result<u64, StorageError>;

    /// Load one row by primary key, whoever owns it
    async fn fetch(&self, target: &StorageTarget, entity: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let mut query = FilterData::matching(by_id(id));
        query.limit = Some(1);
        Ok(self.select(target, entity, &query).await?.into_iter().next())
    }
}

fn by_id(id: &str) -> Value {
    let mut map = Map::new();
    map.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Value::Object(map)
}

/// Resolved scope for one repository call
enum Access {
    Tenant(Arc<TenantContext>),
    Exempt,
}

/// Storage interceptor for one entity type.
///
/// - tenant scope: reads are filtered to the tenant's rows in the tenant's
///   storage target, writes are stamped with and checked against the tenant
/// - all-tenants exemption: unfiltered access to the shared target, each call
///   audited at warn
/// - no scope: [`IsolationError::Unscoped`]
pub struct ScopedRepository<T: TenantScoped> {
    store: Arc<dyn RecordStore>,
    audit: AuditLog,
    shared_target: StorageTarget,
    _entity: PhantomData<fn() -> T>,
}

impl<T: TenantScoped> Clone for ScopedRepository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            audit: self.audit.clone(),
            shared_target: self.shared_target.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: TenantScoped> ScopedRepository<T> {
    pub fn new(store: Arc<dyn RecordStore>, audit: AuditLog, shared_target: StorageTarget) -> Self {
        Self {
            store,
            audit,
            shared_target,
            _entity: PhantomData,
        }
    }

    /// Rows matching `query`. The select list is ignored; entities load whole.
    pub async fn find(&self, mut query: FilterData) -> Result<Vec<T>, IsolationError> {
        query.select = None;
        let rows = match self.access("find")? {
            Access::Tenant(ctx) => {
                query.where_clause = Some(Self::scoped(query.where_clause.take(), ctx.tenant_id));
                self.store.select(&ctx.storage_target, T::ENTITY, &query).await?
            }
            Access::Exempt => self.store.select(&self.shared_target, T::ENTITY, &query).await?,
        };
        rows.into_iter().map(Self::decode).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>, IsolationError> {
        let mut query = FilterData::matching(by_id(id));
        query.limit = Some(1);
        Ok(self.find(query).await?.into_iter().next())
    }

    pub async fn count(&self, where_clause: Option<Value>) -> Result<u64, IsolationError> {
        let count = match self.access("count")? {
            Access::Tenant(ctx) => {
                let scoped = Self::scoped(where_clause, ctx.tenant_id);
                self.store.count(&ctx.storage_target, T::ENTITY, &scoped).await?
            }
            Access::Exempt => {
                let where_clause = where_clause.unwrap_or(Value::Null);
                self.store.count(&self.shared_target, T::ENTITY, &where_clause).await?
            }
        };
        Ok(count)
    }

    pub async fn create(&self, mut entity: T) -> Result<T, IsolationError> {
        let target = match self.access("create")? {
            Access::Tenant(ctx) => {
                match entity.tenant_id() {
                    Some(owner) if owner != ctx.tenant_id => {
                        return Err(self.violation("create", Some(entity.id()), &ctx, Some(owner)));
                    }
                    _ => entity.set_tenant_id(ctx.tenant_id),
                }
                ctx.storage_target.clone()
            }
            Access::Exempt => {
                if entity.tenant_id().is_none() {
                    return Err(StorageError::InvalidRecord(format!(
                        "{} rows written under an exemption must name their tenant",
                        T::ENTITY
                    ))
                    .into());
                }
                self.shared_target.clone()
            }
        };

        let row = serde_json::to_value(&entity).map_err(StorageError::from)?;
        let stored = self.store.insert(&target, T::ENTITY, row).await?;
        Self::decode(stored)
    }

    pub async fn update(&self, mut entity: T) -> Result<T, IsolationError> {
        let id = entity.id();
        let (target, owner) = match self.access("update")? {
            Access::Tenant(ctx) => {
                match self.owner_of(&ctx.storage_target, &id).await? {
                    None => return Err(self.not_found(&id)),
                    Some(owner) if owner != Some(ctx.tenant_id) => {
                        return Err(self.violation("update", Some(id), &ctx, owner));
                    }
                    Some(_) => {}
                }
                if let Some(claimed) = entity.tenant_id().filter(|claimed| *claimed != ctx.tenant_id) {
                    return Err(self.violation("update", Some(id), &ctx, Some(claimed)));
                }
                entity.set_tenant_id(ctx.tenant_id);
                (ctx.storage_target.clone(), ctx.tenant_id)
            }
            Access::Exempt => {
                let owner = self.exempt_owner(&id).await?;
                entity.set_tenant_id(owner);
                (self.shared_target.clone(), owner)
            }
        };

        let changes = serde_json::to_value(&entity).map_err(StorageError::from)?;
        let affected = self
            .store
            .update(&target, T::ENTITY, changes, &Self::owned_row(&id, owner))
            .await?;
        if affected == 0 {
            return Err(self.not_found(&id));
        }
        Ok(entity)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, IsolationError> {
        let (target, owner) = match self.access("delete")? {
            Access::Tenant(ctx) => match self.owner_of(&ctx.storage_target, id).await? {
                None => return Ok(false),
                Some(owner) if owner != Some(ctx.tenant_id) => {
                    return Err(self.violation("delete", Some(id.to_string()), &ctx, owner));
                }
                Some(_) => (ctx.storage_target.clone(), ctx.tenant_id),
            },
            Access::Exempt => match self.owner_of(&self.shared_target, id).await? {
                None => return Ok(false),
                Some(Some(owner)) => (self.shared_target.clone(), owner),
                Some(None) => return Err(Self::unowned(id)),
            },
        };

        let affected = self.store.delete(&target, T::ENTITY, &Self::owned_row(id, owner)).await?;
        Ok(affected > 0)
    }

    fn access(&self, operation: &str) -> Result<Access, IsolationError> {
        match ContextStore::get() {
            Some(Scope::Tenant(ctx)) => Ok(Access::Tenant(ctx)),
            Some(Scope::AllTenants(exemption)) => {
                self.audit.emit(AuditKind::ExemptOperation {
                    surface: "storage",
                    operation: exemption.operation().to_string(),
                    target: format!("{} {}", operation, T::ENTITY),
                });
                Ok(Access::Exempt)
            }
            None => {
                self.audit.emit(AuditKind::UnscopedOperation {
                    surface: "storage",
                    operation: operation.to_string(),
                    target: T::ENTITY.to_string(),
                    rejected: true,
                });
                Err(IsolationError::unscoped(operation, T::ENTITY))
            }
        }
    }

    /// `None` when the row does not exist, `Some(None)` when it exists
    /// without a readable owner. An unowned row never counts as the caller's.
    async fn owner_of(&self, target: &StorageTarget, id: &str) -> Result<Option<Option<TenantId>>, IsolationError> {
        let Some(row) = self.store.fetch(target, T::ENTITY, id).await? else {
            return Ok(None);
        };
        Ok(Some(
            row.get(T::SCOPE_FIELD)
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse().ok()),
        ))
    }

    /// Exempt writes stay on the row's own tenant
    async fn exempt_owner(&self, id: &str) -> Result<TenantId, IsolationError> {
        match self.owner_of(&self.shared_target, id).await? {
            Some(Some(owner)) => Ok(owner),
            Some(None) => Err(Self::unowned(id)),
            None => Err(self.not_found(id)),
        }
    }

    fn violation(
        &self,
        operation: &str,
        id: Option<String>,
        ctx: &TenantContext,
        owner: Option<TenantId>,
    ) -> IsolationError {
        self.audit.emit(AuditKind::CrossTenantViolation {
            surface: "storage",
            operation: operation.to_string(),
            entity: T::ENTITY.to_string(),
            record_id: id.clone(),
            context_tenant: ctx.tenant_id,
            owner_tenant: owner,
        });
        IsolationError::CrossTenantViolation {
            entity: T::ENTITY.to_string(),
            id,
            operation: operation.to_string(),
            context_tenant: ctx.tenant_id,
            owner_tenant: owner,
        }
    }

    fn unowned(id: &str) -> IsolationError {
        StorageError::InvalidRecord(format!("{} {} has no owning tenant", T::ENTITY, id)).into()
    }

    fn not_found(&self, id: &str) -> IsolationError {
        StorageError::NotFound {
            entity: T::ENTITY.to_string(),
            id: id.to_string(),
        }
        .into()
    }

    fn scope_predicate(tenant: TenantId) -> Value {
        let mut map = Map::new();
        map.insert(T::SCOPE_FIELD.to_string(), Value::String(tenant.to_string()));
        Value::Object(map)
    }

    fn scoped(caller: Option<Value>, tenant: TenantId) -> Value {
        match caller {
            None | Some(Value::Null) => Self::scope_predicate(tenant),
            Some(caller) => serde_json::json!({ "$and": [caller, Self::scope_predicate(tenant)] }),
        }
    }

    /// Write predicate: the row must still belong to `owner`
    fn owned_row(id: &str, owner: TenantId) -> Value {
        serde_json::json!({ "$and": [by_id(id), Self::scope_predicate(owner)] })
    }

    fn decode(row: Value) -> Result<T, IsolationError> {
        Ok(serde_json::from_value(row).map_err(StorageError::from)?)
    }
}
