use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connection pools for the system database and every storage target,
/// created lazily on first use and keyed by database name
#[derive(Clone)]
pub struct DatabaseManager {
    pools: Arc<RwLock<HashMap<String, PgPool>>>,
    config: DatabaseConfig,
    shared_database: String,
}

impl DatabaseManager {
    pub fn new(config: DatabaseConfig, shared_database: impl Into<String>) -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            config,
            shared_database: shared_database.into(),
        }
    }

    pub fn system_database(&self) -> &str {
        &self.config.system_database
    }

    /// Get the system database pool (tenant registry)
    pub async fn system_pool(&self) -> Result<PgPool, DatabaseError> {
        let name = self.config.system_database.clone();
        self.get_pool(&name).await
    }

    /// Get a storage pool (validated name)
    pub async fn pool(&self, database_name: &str) -> Result<PgPool, DatabaseError> {
        if !self.is_valid_db_name(database_name) {
            return Err(DatabaseError::InvalidDatabaseName(database_name.to_string()));
        }
        self.get_pool(database_name).await
    }

    /// Get existing pool or create a new one lazily
    async fn get_pool(&self, database_name: &str) -> Result<PgPool, DatabaseError> {
        // Fast path: try read lock
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(database_name) {
                return Ok(pool.clone());
            }
        }

        let mut pools = self.pools.write().await;
        if let Some(pool) = pools.get(database_name) {
            return Ok(pool.clone());
        }

        let connection_string = self.build_connection_string(database_name)?;
        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(Duration::from_secs(self.config.connection_timeout))
            .connect(&connection_string)
            .await?;

        pools.insert(database_name.to_string(), pool.clone());
        info!("Created database pool for: {}", database_name);
        Ok(pool)
    }

    /// Swap the database name into the DATABASE_URL path
    fn build_connection_string(&self, database_name: &str) -> Result<String, DatabaseError> {
        let base = self
            .config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let mut url = url::Url::parse(base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        url.set_path(&format!("/{}", database_name));
        Ok(url.into())
    }

    /// Pings the system pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        let pool = self.system_pool().await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all(&self) {
        let mut pools = self.pools.write().await;
        for (name, pool) in pools.drain() {
            pool.close().await;
            info!("Closed database pool: {}", name);
        }
    }

    /// Accepts the system database, the shared database, and names starting
    /// with "tenant_" or "template_" followed by [a-zA-Z0-9_]+
    pub fn is_valid_db_name(&self, name: &str) -> bool {
        if name == self.config.system_database || name == self.shared_database {
            return true;
        }
        if name.starts_with("tenant_") || name.starts_with("template_") {
            return name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        }
        false
    }
}
