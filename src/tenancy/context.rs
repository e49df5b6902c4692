//! Request-scoped tenant context.
//!
//! Async code carries the context in a task-local slot owned by the future
//! that [`ContextStore::scope`] or [`ContextStore::enter`] wraps. The slot is
//! destroyed together with that future, so it is gone after completion, error,
//! panic or cancellation, and a worker that picks up the next request starts
//! from an empty slot.
//!
//! Blocking worker pools use a thread-local slot bound with
//! [`ContextStore::bind_thread`]; the returned guard clears it on drop,
//! including while unwinding from a panic.

use serde::Serialize;
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

use super::model::{StorageTarget, TenantId};
use crate::isolation::{Exemption, IsolationError};

tokio::task_local! {
    static TASK_SCOPE: RefCell<Option<Scope>>;
}

thread_local! {
    static THREAD_SCOPE: RefCell<Option<Scope>> = const { RefCell::new(None) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextOrigin {
    Request,
    Background,
}

/// Resolved tenant identity for one request or task. Immutable once installed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub tenant_name: String,
    pub storage_target: StorageTarget,
    pub origin: ContextOrigin,
    pub request_id: String,
}

impl TenantContext {
    pub fn new(
        tenant_id: TenantId,
        tenant_name: impl Into<String>,
        storage_target: StorageTarget,
        origin: ContextOrigin,
    ) -> Self {
        Self {
            tenant_id,
            tenant_name: tenant_name.into(),
            storage_target,
            origin,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// What the current unit of work is allowed to touch
#[derive(Debug, Clone)]
pub enum Scope {
    Tenant(Arc<TenantContext>),
    /// Allow-listed maintenance operation spanning all tenants
    AllTenants(Exemption),
}

impl Scope {
    pub fn tenant(ctx: TenantContext) -> Self {
        Scope::Tenant(Arc::new(ctx))
    }

    pub fn tenant_context(&self) -> Option<&Arc<TenantContext>> {
        match self {
            Scope::Tenant(ctx) => Some(ctx),
            Scope::AllTenants(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("tenant context is already set for this request")]
    AlreadySet,

    #[error("no context scope is active")]
    NoScope,
}

pub struct ContextStore;

impl ContextStore {
    /// Run `fut` with an empty context slot that [`ContextStore::set`] can fill
    pub async fn scope<F: Future>(fut: F) -> F::Output {
        TASK_SCOPE.scope(RefCell::new(None), fut).await
    }

    /// Run `fut` with `scope` installed
    pub async fn enter<F: Future>(scope: Scope, fut: F) -> F::Output {
        TASK_SCOPE.scope(RefCell::new(Some(scope)), fut).await
    }

    /// Fill the current task's empty slot
    pub fn set(scope: Scope) -> Result<(), ContextError> {
        TASK_SCOPE
            .try_with(|slot| {
                let mut slot = slot.borrow_mut();
                if slot.is_some() {
                    return Err(ContextError::AlreadySet);
                }
                *slot = Some(scope);
                Ok(())
            })
            .unwrap_or(Err(ContextError::NoScope))
    }

    pub fn get() -> Option<Scope> {
        match TASK_SCOPE.try_with(|slot| slot.borrow().clone()) {
            Ok(scope) => scope,
            Err(_) => THREAD_SCOPE.with(|slot| slot.borrow().clone()),
        }
    }

    pub fn clear() {
        if TASK_SCOPE.try_with(|slot| slot.borrow_mut().take()).is_err() {
            THREAD_SCOPE.with(|slot| slot.borrow_mut().take());
        }
    }

    pub fn current_tenant() -> Option<Arc<TenantContext>> {
        Self::get().and_then(|scope| scope.tenant_context().cloned())
    }

    pub fn require_tenant(operation: &str, target: &str) -> Result<Arc<TenantContext>, IsolationError> {
        Self::current_tenant().ok_or_else(|| IsolationError::Unscoped {
            operation: operation.to_string(),
            target: target.to_string(),
        })
    }

    pub fn request_id() -> Option<String> {
        Self::current_tenant().map(|ctx| ctx.request_id.clone())
    }

    /// Bind `scope` to the calling thread until the guard is dropped
    pub fn bind_thread(scope: Scope) -> Result<ThreadScopeGuard, ContextError> {
        THREAD_SCOPE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(ContextError::AlreadySet);
            }
            *slot = Some(scope);
            Ok(ThreadScopeGuard { _not_send: PhantomData })
        })
    }

    /// Carry the caller's scope into a future that will run on another task,
    /// e.g. one passed to `tokio::spawn`
    pub fn inherit<F: Future>(fut: F) -> impl Future<Output = F::Output> {
        let captured = Self::get();
        async move {
            match captured {
                Some(scope) => Self::enter(scope, fut).await,
                None => Self::scope(fut).await,
            }
        }
    }

    /// Carry the caller's scope into a closure that will run on a blocking
    /// thread, e.g. one passed to `tokio::task::spawn_blocking`
    pub fn inherit_blocking<F, R>(f: F) -> impl FnOnce() -> R + Send + 'static
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let captured = Self::get();
        move || {
            let _guard = captured.and_then(|scope| Self::bind_thread(scope).ok());
            f()
        }
    }
}

/// Clears the thread-local slot on drop
#[must_use = "the thread scope is cleared when the guard is dropped"]
pub struct ThreadScopeGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ThreadScopeGuard {
    fn drop(&mut self) {
        THREAD_SCOPE.with(|slot| slot.borrow_mut().take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(name: &str) -> TenantContext {
        TenantContext::new(TenantId::new(), name, StorageTarget::new("shared"), ContextOrigin::Request)
    }

    #[tokio::test]
    async fn enter_installs_and_drops_scope() {
        assert!(ContextStore::get().is_none());
        let seen = ContextStore::enter(Scope::tenant(ctx("acme")), async {
            ContextStore::current_tenant().map(|c| c.tenant_name.clone())
        })
        .await;
        assert_eq!(seen.as_deref(), Some("acme"));
        assert!(ContextStore::get().is_none());
    }

    #[tokio::test]
    async fn set_is_write_once() {
        ContextStore::scope(async {
            assert!(ContextStore::get().is_none());
            ContextStore::set(Scope::tenant(ctx("acme"))).unwrap();
            assert_eq!(
                ContextStore::set(Scope::tenant(ctx("globex"))),
                Err(ContextError::AlreadySet)
            );
            assert_eq!(ContextStore::current_tenant().unwrap().tenant_name, "acme");
            ContextStore::clear();
            assert!(ContextStore::get().is_none());
        })
        .await;
    }

    #[test]
    fn set_outside_scope_fails() {
        assert_eq!(ContextStore::set(Scope::tenant(ctx("acme"))), Err(ContextError::NoScope));
    }

    #[test]
    fn require_tenant_reports_unscoped() {
        let err = ContextStore::require_tenant("find", "invoices").unwrap_err();
        assert!(matches!(err, IsolationError::Unscoped { .. }));
    }

    #[test]
    fn thread_guard_clears_on_drop_and_panic() {
        {
            let _guard = ContextStore::bind_thread(Scope::tenant(ctx("acme"))).unwrap();
            assert!(ContextStore::current_tenant().is_some());
            assert_eq!(
                ContextStore::bind_thread(Scope::tenant(ctx("globex"))).err(),
                Some(ContextError::AlreadySet)
            );
        }
        assert!(ContextStore::get().is_none());

        let result = std::panic::catch_unwind(|| {
            let _guard = ContextStore::bind_thread(Scope::tenant(ctx("acme"))).unwrap();
            panic!("job failed");
        });
        assert!(result.is_err());
        assert!(ContextStore::get().is_none());
    }

    #[tokio::test]
    async fn spawned_tasks_only_see_inherited_scope() {
        ContextStore::enter(Scope::tenant(ctx("acme")), async {
            let plain = tokio::spawn(async { ContextStore::current_tenant() }).await.unwrap();
            assert!(plain.is_none());

            let inherited = tokio::spawn(ContextStore::inherit(async {
                ContextStore::current_tenant().map(|c| c.tenant_name.clone())
            }))
            .await
            .unwrap();
            assert_eq!(inherited.as_deref(), Some("acme"));

            let blocking = tokio::task::spawn_blocking(ContextStore::inherit_blocking(|| {
                ContextStore::current_tenant().map(|c| c.tenant_name.clone())
            }))
            .await
            .unwrap();
            assert_eq!(blocking.as_deref(), Some("acme"));
        })
        .await;
    }
}
