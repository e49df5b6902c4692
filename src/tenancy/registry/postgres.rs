use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::{RegistryError, TenantRegistry};
use crate::tenancy::model::{LifecycleState, NewTenant, StorageTarget, Suspension, Tenant, TenantId};
use crate::tenancy::routing::{RoutingKey, RoutingKeyKind};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        state TEXT NOT NULL,
        storage_database TEXT NOT NULL,
        storage_schema TEXT,
        suspended_at TIMESTAMPTZ,
        suspended_reason TEXT,
        suspended_by TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        deleted_at TIMESTAMPTZ,
        version BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tenant_routing_keys (
        kind TEXT NOT NULL,
        value TEXT NOT NULL,
        tenant_id UUID NOT NULL REFERENCES tenants (id),
        PRIMARY KEY (kind, value)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS tenant_routing_keys_tenant_idx ON tenant_routing_keys (tenant_id)",
];

const SELECT_TENANT: &str = r#"
    SELECT id, name, state, storage_database, storage_schema,
           suspended_at, suspended_reason, suspended_by,
           created_at, updated_at, deleted_at, version
    FROM tenants
"#;

/// Registry stored in the system database
#[derive(Clone)]
pub struct PgTenantRegistry {
    pool: PgPool,
}

impl PgTenantRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the registry tables if they do not exist
    pub async fn migrate(&self) -> Result<(), RegistryError> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await.map_err(map_sqlx)?;
        }
        info!("Tenant registry schema is up to date");
        Ok(())
    }

    async fn load_keys(&self, id: TenantId) -> Result<Vec<RoutingKey>, RegistryError> {
        let rows = sqlx::query("SELECT kind, value FROM tenant_routing_keys WHERE tenant_id = $1 ORDER BY kind, value")
            .bind(*id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(key_from_row).collect()
    }

    async fn insert_keys(
        tx: &mut Transaction<'_, Postgres>,
        id: TenantId,
        keys: &[RoutingKey],
    ) -> Result<(), RegistryError> {
        for key in keys {
            sqlx::query("INSERT INTO tenant_routing_keys (kind, value, tenant_id) VALUES ($1, $2, $3)")
                .bind(key.kind().as_str())
                .bind(key.value())
                .bind(*id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_key_violation(e, key))?;
        }
        Ok(())
    }
}

#[async_trait]
impl TenantRegistry for PgTenantRegistry {
    async fn insert(&self, new: NewTenant) -> Result<Tenant, RegistryError> {
        let tenant = Tenant::from_new(new);
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, state, storage_database, storage_schema,
                                 created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*tenant.id.as_uuid())
        .bind(&tenant.name)
        .bind(tenant.state.as_str())
        .bind(&tenant.storage_target.database)
        .bind(tenant.storage_target.schema.as_deref())
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .bind(tenant.version)
        .execute(&mut *tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            true => RegistryError::AlreadyExists(tenant.id),
            false => map_sqlx(e),
        })?;

        Self::insert_keys(&mut tx, tenant.id, &tenant.routing_keys).await?;
        tx.commit().await.map_err(map_sqlx)?;

        debug!("Registered tenant {} ({})", tenant.name, tenant.id);
        Ok(tenant)
    }

    async fn get(&self, id: TenantId) -> Result<Option<Tenant>, RegistryError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_TENANT))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(row) => {
                let keys = self.load_keys(id).await?;
                Ok(Some(tenant_from_row(&row, keys)?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_routing_key(&self, key: &RoutingKey) -> Result<Option<Tenant>, RegistryError> {
        let owner: Option<Uuid> = sqlx::query_scalar(
            "SELECT tenant_id FROM tenant_routing_keys WHERE kind = $1 AND value = $2",
        )
        .bind(key.kind().as_str())
        .bind(key.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        match owner {
            Some(id) => self.get(TenantId::from_uuid(id)).await,
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Tenant>, RegistryError> {
        let rows = sqlx::query(&format!("{} ORDER BY created_at, name", SELECT_TENANT))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let mut tenants = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: Uuid = row.try_get("id").map_err(map_sqlx)?;
            let keys = self.load_keys(TenantId::from_uuid(id)).await?;
            tenants.push(tenant_from_row(row, keys)?);
        }
        Ok(tenants)
    }

    async fn save(&self, tenant: &Tenant) -> Result<Tenant, RegistryError> {
        let mut stored = tenant.clone();
        stored.version = tenant.version + 1;
        stored.updated_at = Utc::now();

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let result = sqlx::query(
            r#"
            UPDATE tenants SET
                name = $3, state = $4, storage_database = $5, storage_schema = $6,
                suspended_at = $7, suspended_reason = $8, suspended_by = $9,
                updated_at = $10, deleted_at = $11, version = $12
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(*tenant.id.as_uuid())
        .bind(tenant.version)
        .bind(&stored.name)
        .bind(stored.state.as_str())
        .bind(&stored.storage_target.database)
        .bind(stored.storage_target.schema.as_deref())
        .bind(stored.suspension.as_ref().map(|s| s.at))
        .bind(stored.suspension.as_ref().map(|s| s.reason.clone()))
        .bind(stored.suspension.as_ref().map(|s| s.actor.clone()))
        .bind(stored.updated_at)
        .bind(stored.deleted_at)
        .bind(stored.version)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM tenants WHERE id = $1")
                .bind(*tenant.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            return Err(match exists {
                Some(_) => RegistryError::VersionConflict { id: tenant.id, expected: tenant.version },
                None => RegistryError::NotFound(tenant.id),
            });
        }

        sqlx::query("DELETE FROM tenant_routing_keys WHERE tenant_id = $1")
            .bind(*tenant.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        Self::insert_keys(&mut tx, tenant.id, &stored.routing_keys).await?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(stored)
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(map_sqlx)?;
        Ok(())
    }
}

fn tenant_from_row(row: &PgRow, routing_keys: Vec<RoutingKey>) -> Result<Tenant, RegistryError> {
    let state: String = row.try_get("state").map_err(map_sqlx)?;
    let state: LifecycleState = state.parse().map_err(RegistryError::Invalid)?;

    let suspended_at: Option<DateTime<Utc>> = row.try_get("suspended_at").map_err(map_sqlx)?;
    let suspension = match suspended_at {
        Some(at) => Some(Suspension {
            at,
            reason: row
                .try_get::<Option<String>, _>("suspended_reason")
                .map_err(map_sqlx)?
                .unwrap_or_default(),
            actor: row
                .try_get::<Option<String>, _>("suspended_by")
                .map_err(map_sqlx)?
                .unwrap_or_default(),
        }),
        None => None,
    };

    let id: Uuid = row.try_get("id").map_err(map_sqlx)?;
    Ok(Tenant {
        id: TenantId::from_uuid(id),
        name: row.try_get("name").map_err(map_sqlx)?,
        routing_keys,
        state,
        storage_target: StorageTarget {
            database: row.try_get("storage_database").map_err(map_sqlx)?,
            schema: row.try_get("storage_schema").map_err(map_sqlx)?,
        },
        suspension,
        created_at: row.try_get("created_at").map_err(map_sqlx)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
        deleted_at: row.try_get("deleted_at").map_err(map_sqlx)?,
        version: row.try_get("version").map_err(map_sqlx)?,
    })
}

fn key_from_row(row: &PgRow) -> Result<RoutingKey, RegistryError> {
    let kind: String = row.try_get("kind").map_err(map_sqlx)?;
    let value: String = row.try_get("value").map_err(map_sqlx)?;
    let kind: RoutingKeyKind = kind
        .parse()
        .map_err(|e: crate::tenancy::routing::RoutingKeyError| RegistryError::Invalid(e.to_string()))?;
    RoutingKey::parse(kind, &value).map_err(|e| RegistryError::Invalid(e.to_string()))
}

fn unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn map_key_violation(err: sqlx::Error, key: &RoutingKey) -> RegistryError {
    if unique_violation(&err) {
        RegistryError::RoutingKeyTaken(key.clone())
    } else {
        map_sqlx(err)
    }
}

/// Registry failures are reported as unavailability so callers fail closed
fn map_sqlx(err: sqlx::Error) -> RegistryError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            RegistryError::Invalid(err.to_string())
        }
        other => {
            tracing::error!("Tenant registry query failed: {}", other);
            RegistryError::Unavailable(other.to_string())
        }
    }
}
