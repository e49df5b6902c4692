//! Scoped repository over the Postgres record store.
//!
//! Needs a reachable database: set DATABASE_URL (the path names the database
//! used as shared storage). Without it every test returns early.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use tenant_guard::config::{DatabaseConfig, TenancyConfig};
use tenant_guard::database::DatabaseManager;
use tenant_guard::filter::FilterData;
use tenant_guard::isolation::{IsolationError, PgRecordStore, ScopedRepository, TenantScoped};
use tenant_guard::tenancy::{AuditLog, InMemoryRegistry, NewTenant, RoutingKey, StorageTarget, Tenancy, TenantId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Invoice {
    id: String,
    tenant_id: Option<TenantId>,
    number: String,
    total: i64,
}

impl Invoice {
    fn new(id: &str, number: &str, total: i64) -> Self {
        Self { id: id.into(), tenant_id: None, number: number.into(), total }
    }
}

impl TenantScoped for Invoice {
    const ENTITY: &'static str = "invoices";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn set_tenant_id(&mut self, tenant_id: TenantId) {
        self.tenant_id = Some(tenant_id);
    }
}

struct PgHarness {
    tenancy: Tenancy,
    databases: DatabaseManager,
    target: StorageTarget,
    invoices: ScopedRepository<Invoice>,
}

impl PgHarness {
    /// None when DATABASE_URL is unset
    async fn connect() -> Result<Option<Self>> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping Postgres store test");
            return Ok(None);
        };
        let database = url::Url::parse(&url)?
            .path()
            .trim_start_matches('/')
            .to_string();
        anyhow::ensure!(!database.is_empty(), "DATABASE_URL must name a database");

        let databases = DatabaseManager::new(
            DatabaseConfig {
                url: Some(url),
                system_database: database.clone(),
                max_connections: 4,
                connection_timeout: 5,
            },
            database.clone(),
        );

        // One schema per run keeps concurrent runs apart
        let schema = format!("tg_test_{}", uuid::Uuid::new_v4().simple());
        let pool = databases.pool(&database).await?;
        sqlx::query(&format!("CREATE SCHEMA {schema}")).execute(&pool).await?;
        sqlx::query(&format!(
            "CREATE TABLE {schema}.invoices (id text PRIMARY KEY, tenant_id text, number text NOT NULL, total bigint NOT NULL)"
        ))
        .execute(&pool)
        .await?;

        let config = TenancyConfig { shared_database: database.clone(), ..TenancyConfig::default() };
        let tenancy = Tenancy::new(Arc::new(InMemoryRegistry::new()), AuditLog::new(), config)
            .with_record_store(Arc::new(PgRecordStore::new(databases.clone())));
        let invoices = tenancy.scoped::<Invoice>();

        Ok(Some(Self {
            tenancy,
            databases,
            target: StorageTarget::new(database).with_schema(schema),
            invoices,
        }))
    }

    async fn tenant(&self, name: &str) -> Result<TenantId> {
        let new = NewTenant::new(name, self.target.clone()).routing_key(RoutingKey::header(&name.to_lowercase())?);
        Ok(self.tenancy.lifecycle().create_tenant(new, "test-admin").await?)
    }

    async fn drop_schema(&self) -> Result<()> {
        let schema = self.target.schema.as_deref().context("schema")?;
        let pool = self.databases.pool(&self.target.database).await?;
        sqlx::query(&format!("DROP SCHEMA {schema} CASCADE")).execute(&pool).await?;
        self.databases.close_all().await;
        Ok(())
    }
}

#[tokio::test]
async fn scoped_crud_round_trip_in_postgres() -> Result<()> {
    let Some(h) = PgHarness::connect().await? else {
        return Ok(());
    };
    let a = h.tenant("Acme").await?;
    let b = h.tenant("Globex").await?;

    let created = h.tenancy.run_as_tenant(a, h.invoices.create(Invoice::new("1", "A-1", 10))).await??;
    assert_eq!(created.tenant_id, Some(a));
    h.tenancy.run_as_tenant(a, h.invoices.create(Invoice::new("2", "A-2", 20))).await??;
    h.tenancy.run_as_tenant(b, h.invoices.create(Invoice::new("3", "B-1", 30))).await??;

    let mine = h
        .tenancy
        .run_as_tenant(a, h.invoices.find(FilterData::matching(json!({"total": {"$gte": 0}}))))
        .await??;
    let mut numbers: Vec<_> = mine.into_iter().map(|i| i.number).collect();
    numbers.sort();
    assert_eq!(numbers, vec!["A-1", "A-2"]);

    // Widening through $or stays inside the tenant
    let widened = h
        .tenancy
        .run_as_tenant(a, h.invoices.count(Some(json!({"$or": [{"number": "B-1"}, {"total": {"$gt": 0}}]}))))
        .await??;
    assert_eq!(widened, 2);

    let mut edited = Invoice::new("1", "A-1", 15);
    edited.tenant_id = Some(a);
    let updated = h.tenancy.run_as_tenant(a, h.invoices.update(edited)).await??;
    assert_eq!(updated.total, 15);
    assert_eq!(h.tenancy.run_as_tenant(a, h.invoices.get("1")).await??.map(|i| i.total), Some(15));

    assert!(h.tenancy.run_as_tenant(a, h.invoices.delete("2")).await??);
    assert!(!h.tenancy.run_as_tenant(a, h.invoices.delete("2")).await??);
    assert_eq!(h.tenancy.run_as_tenant(b, h.invoices.count(None)).await??, 1);

    h.drop_schema().await
}

#[tokio::test]
async fn cross_tenant_writes_are_blocked_in_postgres() -> Result<()> {
    let Some(h) = PgHarness::connect().await? else {
        return Ok(());
    };
    let a = h.tenant("Acme").await?;
    let b = h.tenant("Globex").await?;
    h.tenancy.run_as_tenant(b, h.invoices.create(Invoice::new("7", "B-7", 70))).await??;

    let mut hijack = Invoice::new("7", "A-hijack", 0);
    hijack.tenant_id = Some(a);
    let err = h.tenancy.run_as_tenant(a, h.invoices.update(hijack)).await?.unwrap_err();
    assert!(matches!(
        err,
        IsolationError::CrossTenantViolation { context_tenant, owner_tenant: Some(owner), .. }
            if context_tenant == a && owner == b
    ));

    let err = h.tenancy.run_as_tenant(a, h.invoices.delete("7")).await?.unwrap_err();
    assert!(matches!(err, IsolationError::CrossTenantViolation { .. }));

    // Not visible to the other tenant, untouched for the owner
    assert!(h.tenancy.run_as_tenant(a, h.invoices.get("7")).await??.is_none());
    let kept = h.tenancy.run_as_tenant(b, h.invoices.get("7")).await??;
    assert_eq!(kept.map(|i| (i.number, i.total)), Some(("B-7".to_string(), 70)));

    h.drop_schema().await
}
