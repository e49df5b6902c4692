//! Durable tenant records.
//!
//! The registry is the source of truth for tenant identity, routing keys and
//! lifecycle state. The resolver reads it on cache misses; the lifecycle
//! controller is the only writer.

pub mod memory;
pub mod postgres;
pub mod seed;

use async_trait::async_trait;
use thiserror::Error;

use super::model::{NewTenant, Tenant, TenantId};
use super::routing::RoutingKey;

pub use memory::InMemoryRegistry;
pub use postgres::PgTenantRegistry;
pub use seed::{apply_seed, load_seed, SeedError, TenantSeed};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("tenant not found: {0}")]
    NotFound(TenantId),

    #[error("tenant already exists: {0}")]
    AlreadyExists(TenantId),

    #[error("routing key {0} is already assigned")]
    RoutingKeyTaken(RoutingKey),

    #[error("tenant {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: TenantId, expected: i64 },

    #[error("invalid tenant record: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Store a new tenant in the active state. Routing keys must be unused,
    /// including keys still held by deleted tenants.
    async fn insert(&self, tenant: NewTenant) -> Result<Tenant, RegistryError>;

    async fn get(&self, id: TenantId) -> Result<Option<Tenant>, RegistryError>;

    async fn find_by_routing_key(&self, key: &RoutingKey) -> Result<Option<Tenant>, RegistryError>;

    async fn list(&self) -> Result<Vec<Tenant>, RegistryError>;

    /// Persist `tenant` if the stored version still equals `tenant.version`.
    /// Returns the stored record with its bumped version.
    async fn save(&self, tenant: &Tenant) -> Result<Tenant, RegistryError>;

    async fn ping(&self) -> Result<(), RegistryError>;
}
