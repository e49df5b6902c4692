//! Tenant identity: registry, resolution, request-scoped context and
//! lifecycle administration.

pub mod audit;
pub mod cache;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod routing;

pub use audit::{AuditEvent, AuditKind, AuditLog, AuditSink, MemoryAuditSink, ResolutionOutcome};
pub use cache::ResolutionCache;
pub use context::{ContextError, ContextOrigin, ContextStore, Scope, TenantContext, ThreadScopeGuard};
pub use dispatch::{DispatchError, Tenancy};
pub use error::ResolveError;
pub use lifecycle::{InvalidLifecycleTransition, LifecycleAction, LifecycleController, LifecycleError, Transition};
pub use model::{LifecycleState, NewTenant, StorageTarget, Suspension, Tenant, TenantId, TenantStatus};
pub use registry::{InMemoryRegistry, PgTenantRegistry, RegistryError, TenantRegistry};
pub use resolver::{AddressingInfo, ResolutionSource, ResolvedTenant, Resolver, ResolverSettings, Strategy};
pub use routing::{RoutingKey, RoutingKeyKind};
