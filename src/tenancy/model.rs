use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::routing::RoutingKey;

/// Opaque tenant identifier, the primary scoping key for every tenant-owned row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TenantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Suspended,
    Deleted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "active",
            LifecycleState::Suspended => "suspended",
            LifecycleState::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LifecycleState::Active),
            "suspended" => Ok(LifecycleState::Suspended),
            "deleted" => Ok(LifecycleState::Deleted),
            other => Err(format!("unknown lifecycle state: {}", other)),
        }
    }
}

/// Where a tenant's rows live. A shared target holds many tenants separated by
/// the scope column; a dedicated target holds one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageTarget {
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl StorageTarget {
    pub fn new(database: impl Into<String>) -> Self {
        Self { database: database.into(), schema: None }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Accepts `tenant_*`, `template_*` or the shared database name, and
    /// identifier characters only in both database and schema.
    pub fn validate(&self, shared_database: &str) -> Result<(), String> {
        let db = self.database.as_str();
        if db.is_empty() || db.len() > 63 {
            return Err("storage database name must be 1-63 characters".to_string());
        }
        if !is_identifier(db) {
            return Err(format!("storage database '{}' contains invalid characters", db));
        }
        if db != shared_database && !db.starts_with("tenant_") && !db.starts_with("template_") {
            return Err(format!(
                "storage database '{}' must be '{}' or start with tenant_ / template_",
                db, shared_database
            ));
        }
        if let Some(schema) = &self.schema {
            if schema.is_empty() || schema.len() > 63 || !is_identifier(schema) {
                return Err(format!("storage schema '{}' is not a valid identifier", schema));
            }
        }
        Ok(())
    }
}

impl fmt::Display for StorageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", self.database, schema),
            None => f.write_str(&self.database),
        }
    }
}

fn is_identifier(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    pub at: DateTime<Utc>,
    pub reason: String,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub routing_keys: Vec<RoutingKey>,
    pub state: LifecycleState,
    pub storage_target: StorageTarget,
    pub suspension: Option<Suspension>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Tenant {
    pub fn from_new(new: NewTenant) -> Self {
        let now = Utc::now();
        Self {
            id: new.id.unwrap_or_default(),
            name: new.name,
            routing_keys: new.routing_keys,
            state: LifecycleState::Active,
            storage_target: new.storage_target,
            suspension: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 1,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }

    pub fn status(&self) -> TenantStatus {
        TenantStatus::from(self)
    }

    /// Tenant names: 2-100 characters of letters, digits, hyphen, underscore or space
    pub fn validate_name(name: &str) -> Result<(), String> {
        let trimmed = name.trim();
        if trimmed.chars().count() < 2 {
            return Err("Tenant name must be at least 2 characters".to_string());
        }
        if trimmed.chars().count() > 100 {
            return Err("Tenant name must be at most 100 characters".to_string());
        }
        if !trimmed
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == ' ')
        {
            return Err(
                "Tenant name can only contain letters, numbers, spaces, hyphens, and underscores".to_string(),
            );
        }
        Ok(())
    }
}

/// Input for tenant creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTenant {
    #[serde(default)]
    pub id: Option<TenantId>,
    pub name: String,
    pub routing_keys: Vec<RoutingKey>,
    pub storage_target: StorageTarget,
}

impl NewTenant {
    pub fn new(name: impl Into<String>, storage_target: StorageTarget) -> Self {
        Self {
            id: None,
            name: name.into(),
            routing_keys: Vec::new(),
            storage_target,
        }
    }

    pub fn with_id(mut self, id: TenantId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn routing_key(mut self, key: RoutingKey) -> Self {
        self.routing_keys.push(key);
        self
    }
}

/// Administrative view of a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantStatus {
    pub id: TenantId,
    pub name: String,
    pub state: LifecycleState,
    pub routing_keys: Vec<RoutingKey>,
    pub storage_target: StorageTarget,
    pub suspension: Option<Suspension>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<&Tenant> for TenantStatus {
    fn from(t: &Tenant) -> Self {
        Self {
            id: t.id,
            name: t.name.clone(),
            state: t.state,
            routing_keys: t.routing_keys.clone(),
            storage_target: t.storage_target.clone(),
            suspension: t.suspension.clone(),
            created_at: t.created_at,
            updated_at: t.updated_at,
            deleted_at: t.deleted_at,
            version: t.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_round_trips_through_string() {
        let id = TenantId::new();
        let parsed: TenantId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<TenantId>().is_err());
    }

    #[test]
    fn validates_tenant_names() {
        assert!(Tenant::validate_name("Acme Corp").is_ok());
        assert!(Tenant::validate_name("a").is_err());
        assert!(Tenant::validate_name(&"x".repeat(101)).is_err());
        assert!(Tenant::validate_name("acme; drop").is_err());
    }

    #[test]
    fn validates_storage_targets() {
        assert!(StorageTarget::new("tenant_acme").validate("shared").is_ok());
        assert!(StorageTarget::new("shared").with_schema("acme").validate("shared").is_ok());
        assert!(StorageTarget::new("postgres").validate("shared").is_err());
        assert!(StorageTarget::new("tenant-acme").validate("shared").is_err());
        assert!(StorageTarget::new("shared").with_schema("a;b").validate("shared").is_err());
    }

    #[test]
    fn new_tenant_starts_active_at_version_one() {
        let key = RoutingKey::host("acme.example.com").unwrap();
        let tenant = Tenant::from_new(NewTenant::new("Acme", StorageTarget::new("shared")).routing_key(key));
        assert!(tenant.is_active());
        assert_eq!(tenant.version, 1);
        assert!(tenant.suspension.is_none());
        assert_eq!(tenant.routing_keys.len(), 1);
    }
}
