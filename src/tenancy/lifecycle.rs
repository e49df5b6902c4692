//! Tenant lifecycle: the active / suspended / deleted state machine and the
//! administrative operations that drive it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use super::audit::{AuditKind, AuditLog};
use super::cache::ResolutionCache;
use super::model::{LifecycleState, NewTenant, StorageTarget, Suspension, Tenant, TenantId, TenantStatus};
use super::registry::{RegistryError, TenantRegistry};
use super::routing::RoutingKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Suspend,
    Reactivate,
    Delete,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleAction::Suspend => "suspend",
            LifecycleAction::Reactivate => "reactivate",
            LifecycleAction::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed { from: LifecycleState, to: LifecycleState },
    Unchanged(LifecycleState),
}

impl Transition {
    pub fn target(&self) -> LifecycleState {
        match self {
            Transition::Changed { to, .. } => *to,
            Transition::Unchanged(state) => *state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} a tenant that is {from}")]
pub struct InvalidLifecycleTransition {
    pub from: LifecycleState,
    pub action: LifecycleAction,
}

impl LifecycleState {
    pub fn apply(self, action: LifecycleAction) -> Result<Transition, InvalidLifecycleTransition> {
        use LifecycleAction::*;
        use LifecycleState::*;

        match (self, action) {
            (Active, Suspend) => Ok(Transition::Changed { from: Active, to: Suspended }),
            (Suspended, Suspend) => Ok(Transition::Unchanged(Suspended)),
            (Suspended, Reactivate) => Ok(Transition::Changed { from: Suspended, to: Active }),
            (Active, Reactivate) => Ok(Transition::Unchanged(Active)),
            (Active | Suspended, Delete) => Ok(Transition::Changed { from: self, to: Deleted }),
            (Deleted, _) => Err(InvalidLifecycleTransition { from: self, action }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Transition(#[from] InvalidLifecycleTransition),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("tenant {0} is deleted")]
    Deleted(TenantId),

    #[error("{0}")]
    Validation(String),
}

/// Applies administrative changes to tenants.
///
/// Mutations are serialised, written to the registry under a cache mutation
/// guard for the tenant, and audited with the acting admin.
pub struct LifecycleController {
    registry: Arc<dyn TenantRegistry>,
    cache: Arc<ResolutionCache>,
    audit: AuditLog,
    shared_database: String,
    writes: Mutex<()>,
}

impl LifecycleController {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        cache: Arc<ResolutionCache>,
        audit: AuditLog,
        shared_database: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            cache,
            audit,
            shared_database: shared_database.into(),
            writes: Mutex::new(()),
        }
    }

    pub async fn create_tenant(&self, new: NewTenant, actor: &str) -> Result<TenantId, LifecycleError> {
        Tenant::validate_name(&new.name).map_err(LifecycleError::Validation)?;
        new.storage_target
            .validate(&self.shared_database)
            .map_err(LifecycleError::Validation)?;
        if new.routing_keys.is_empty() {
            return Err(LifecycleError::Validation("at least one routing key is required".to_string()));
        }

        let new = NewTenant { name: new.name.trim().to_string(), ..new };
        let _serial = self.writes.lock().await;
        let tenant = self.registry.insert(new).await?;

        tracing::info!("Created tenant {} ({}) by {}", tenant.name, tenant.id, actor);
        self.audit.emit(AuditKind::Lifecycle {
            tenant_id: tenant.id,
            action: "create".to_string(),
            from: None,
            to: Some(tenant.state),
            changed: true,
            actor: actor.to_string(),
            reason: None,
        });
        Ok(tenant.id)
    }

    pub async fn suspend(&self, id: TenantId, reason: &str, actor: &str) -> Result<TenantStatus, LifecycleError> {
        let reason = reason.trim().to_string();
        self.transition(id, LifecycleAction::Suspend, actor, Some(reason.clone()), move |tenant, now| {
            tenant.suspension = Some(Suspension { at: now, reason, actor: actor.to_string() });
        })
        .await
    }

    pub async fn reactivate(&self, id: TenantId, actor: &str) -> Result<TenantStatus, LifecycleError> {
        self.transition(id, LifecycleAction::Reactivate, actor, None, |tenant, _| {
            tenant.suspension = None;
        })
        .await
    }

    /// Logical deletion. The record and its routing keys stay in the registry
    /// as a tombstone so the keys cannot be reassigned.
    pub async fn delete(&self, id: TenantId, actor: &str) -> Result<TenantStatus, LifecycleError> {
        self.transition(id, LifecycleAction::Delete, actor, None, |tenant, now| {
            tenant.deleted_at = Some(now);
        })
        .await
    }

    pub async fn rename(&self, id: TenantId, name: &str, actor: &str) -> Result<TenantStatus, LifecycleError> {
        Tenant::validate_name(name).map_err(LifecycleError::Validation)?;
        let name = name.trim().to_string();
        self.edit(id, "rename", actor, move |tenant| {
            if tenant.name == name {
                return Ok(false);
            }
            tenant.name = name;
            Ok(true)
        })
        .await
    }

    pub async fn add_routing_key(&self, id: TenantId, key: RoutingKey, actor: &str) -> Result<TenantStatus, LifecycleError> {
        self.edit(id, "add_routing_key", actor, move |tenant| {
            if tenant.routing_keys.contains(&key) {
                return Ok(false);
            }
            tenant.routing_keys.push(key);
            Ok(true)
        })
        .await
    }

    pub async fn remove_routing_key(&self, id: TenantId, key: &RoutingKey, actor: &str) -> Result<TenantStatus, LifecycleError> {
        self.edit(id, "remove_routing_key", actor, |tenant| {
            if !tenant.routing_keys.contains(key) {
                return Ok(false);
            }
            if tenant.routing_keys.len() == 1 {
                return Err(LifecycleError::Validation(
                    "a tenant must keep at least one routing key".to_string(),
                ));
            }
            tenant.routing_keys.retain(|k| k != key);
            Ok(true)
        })
        .await
    }

    pub async fn move_storage(&self, id: TenantId, target: StorageTarget, actor: &str) -> Result<TenantStatus, LifecycleError> {
        target
            .validate(&self.shared_database)
            .map_err(LifecycleError::Validation)?;
        self.edit(id, "move_storage", actor, move |tenant| {
            if tenant.storage_target == target {
                return Ok(false);
            }
            tenant.storage_target = target;
            Ok(true)
        })
        .await
    }

    pub async fn status(&self, id: TenantId) -> Result<TenantStatus, LifecycleError> {
        let tenant = self.registry.get(id).await?.ok_or(RegistryError::NotFound(id))?;
        Ok(tenant.status())
    }

    pub async fn list(&self) -> Result<Vec<TenantStatus>, LifecycleError> {
        Ok(self.registry.list().await?.iter().map(TenantStatus::from).collect())
    }

    async fn transition<F>(
        &self,
        id: TenantId,
        action: LifecycleAction,
        actor: &str,
        reason: Option<String>,
        on_change: F,
    ) -> Result<TenantStatus, LifecycleError>
    where
        F: FnOnce(&mut Tenant, chrono::DateTime<Utc>) + Send,
    {
        let _serial = self.writes.lock().await;
        let mut tenant = self.registry.get(id).await?.ok_or(RegistryError::NotFound(id))?;
        let from = tenant.state;

        let transition = match from.apply(action) {
            Ok(transition) => transition,
            Err(err) => {
                tracing::warn!("Rejected lifecycle change for tenant {}: {}", id, err);
                return Err(err.into());
            }
        };

        let status = match transition {
            Transition::Unchanged(_) => tenant.status(),
            Transition::Changed { to, .. } => {
                tenant.state = to;
                on_change(&mut tenant, Utc::now());
                self.persist(&tenant).await?.status()
            }
        };

        self.audit.emit(AuditKind::Lifecycle {
            tenant_id: id,
            action: action.to_string(),
            from: Some(from),
            to: Some(transition.target()),
            changed: matches!(transition, Transition::Changed { .. }),
            actor: actor.to_string(),
            reason,
        });
        Ok(status)
    }

    async fn edit<F>(&self, id: TenantId, action: &str, actor: &str, apply: F) -> Result<TenantStatus, LifecycleError>
    where
        F: FnOnce(&mut Tenant) -> Result<bool, LifecycleError> + Send,
    {
        let _serial = self.writes.lock().await;
        let mut tenant = self.registry.get(id).await?.ok_or(RegistryError::NotFound(id))?;
        if tenant.state == LifecycleState::Deleted {
            return Err(LifecycleError::Deleted(id));
        }

        let changed = apply(&mut tenant)?;
        let status = if changed {
            self.persist(&tenant).await?.status()
        } else {
            tenant.status()
        };

        self.audit.emit(AuditKind::Lifecycle {
            tenant_id: id,
            action: action.to_string(),
            from: Some(tenant.state),
            to: Some(tenant.state),
            changed,
            actor: actor.to_string(),
            reason: None,
        });
        Ok(status)
    }

    /// Write under a mutation guard so the cache purge completes before the
    /// caller sees success
    async fn persist(&self, tenant: &Tenant) -> Result<Tenant, LifecycleError> {
        let _guard = self.cache.begin_mutation(tenant.id);
        Ok(self.registry.save(tenant).await?)
    }
}
