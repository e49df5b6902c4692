use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use super::{RegistryError, TenantRegistry};
use crate::tenancy::model::{NewTenant, StorageTarget, Tenant, TenantId};
use crate::tenancy::routing::RoutingKey;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid seed tenant '{name}': {reason}")]
    Invalid { name: String, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Bootstrap file listing tenants to register on startup
///
/// ```yaml
/// tenants:
///   - id: 6f1c1d9e-8d1e-4c4f-9a0e-0c3b8b2d7f11
///     name: Acme
///     routing_keys: ["host:acme.example.com", "header:acme"]
///     storage: { database: tenant_acme }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TenantSeed {
    #[serde(default)]
    pub tenants: Vec<SeedTenant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedTenant {
    #[serde(default)]
    pub id: Option<TenantId>,
    pub name: String,
    pub routing_keys: Vec<RoutingKey>,
    pub storage: StorageTarget,
}

pub fn load_seed(path: impl AsRef<Path>) -> Result<TenantSeed, SeedError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}

/// Register every seed tenant not already present. Returns how many were added.
pub async fn apply_seed(
    registry: &dyn TenantRegistry,
    seed: &TenantSeed,
    shared_database: &str,
) -> Result<usize, SeedError> {
    let mut added = 0;
    for entry in &seed.tenants {
        let invalid = |reason: String| SeedError::Invalid { name: entry.name.clone(), reason };

        Tenant::validate_name(&entry.name).map_err(invalid)?;
        entry.storage.validate(shared_database).map_err(invalid)?;
        if entry.routing_keys.is_empty() {
            return Err(invalid("at least one routing key is required".to_string()));
        }

        if let Some(id) = entry.id {
            if registry.get(id).await?.is_some() {
                continue;
            }
        }

        let new = NewTenant {
            id: entry.id,
            name: entry.name.clone(),
            routing_keys: entry.routing_keys.clone(),
            storage_target: entry.storage.clone(),
        };
        let tenant = registry.insert(new).await?;
        info!("Seeded tenant {} ({})", tenant.name, tenant.id);
        added += 1;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::registry::InMemoryRegistry;
    use std::io::Write;

    const SEED: &str = r#"
tenants:
  - id: 6f1c1d9e-8d1e-4c4f-9a0e-0c3b8b2d7f11
    name: Acme
    routing_keys: ["host:acme.example.com", "header:acme"]
    storage: { database: tenant_acme }
  - name: Globex
    routing_keys: ["path:globex"]
    storage: { database: shared, schema: globex }
"#;

    #[tokio::test]
    async fn loads_and_applies_seed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED.as_bytes()).unwrap();

        let seed = load_seed(file.path()).unwrap();
        assert_eq!(seed.tenants.len(), 2);

        let registry = InMemoryRegistry::new();
        assert_eq!(apply_seed(&registry, &seed, "shared").await.unwrap(), 2);

        // Tenants with a fixed id are not registered twice
        let only_fixed = TenantSeed { tenants: vec![seed.tenants[0].clone()] };
        assert_eq!(apply_seed(&registry, &only_fixed, "shared").await.unwrap(), 0);

        let acme = registry
            .find_by_routing_key(&RoutingKey::header("acme").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(acme.storage_target.database, "tenant_acme");
    }

    #[test]
    fn rejects_wildcard_keys() {
        let bad = "tenants:\n  - name: Evil\n    routing_keys: [\"host:*.example.com\"]\n    storage: { database: shared }\n";
        assert!(serde_yaml::from_str::<TenantSeed>(bad).is_err());
    }
}
