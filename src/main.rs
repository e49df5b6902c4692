use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tenant_guard::app::{app, AppState};
use tenant_guard::config::{config, AppConfig};
use tenant_guard::database::DatabaseManager;
use tenant_guard::isolation::storage::{InMemoryStore, PgRecordStore, RecordStore};
use tenant_guard::tenancy::audit::AUDIT_TARGET;
use tenant_guard::tenancy::registry::{apply_seed, load_seed};
use tenant_guard::tenancy::{AuditLog, InMemoryRegistry, PgTenantRegistry, Tenancy, TenantRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    let config = config();
    init_tracing(config);
    config.validate().context("invalid configuration")?;
    info!("Starting Tenant Guard in {:?} mode", config.environment);

    let databases = config
        .database
        .url
        .as_ref()
        .map(|_| DatabaseManager::new(config.database.clone(), config.tenancy.shared_database.clone()));

    let registry: Arc<dyn TenantRegistry> = match &databases {
        Some(databases) => {
            let pool = databases.system_pool().await.context("connecting to registry database")?;
            let registry = PgTenantRegistry::new(pool);
            registry.migrate().await.context("migrating tenant registry")?;
            info!(database = databases.system_database(), "Using PostgreSQL tenant registry");
            Arc::new(registry)
        }
        None => {
            if !tenant_guard::is_development!() {
                warn!("DATABASE_URL not set; tenant registry is in-memory and will not persist");
            }
            Arc::new(InMemoryRegistry::new())
        }
    };

    if let Some(path) = &config.api.seed_file {
        let seed = load_seed(path).with_context(|| format!("loading tenant seed {}", path))?;
        let added = apply_seed(registry.as_ref(), &seed, &config.tenancy.shared_database).await?;
        info!(path = %path, added, "Applied tenant seed");
    }

    let records: Arc<dyn RecordStore> = match &databases {
        Some(databases) => {
            let store = PgRecordStore::new(databases.clone());
            Arc::new(match config.api.max_limit {
                Some(max_limit) => store.with_max_limit(max_limit),
                None => store,
            })
        }
        None => Arc::new(InMemoryStore::new()),
    };

    let tenancy = Tenancy::new(registry, AuditLog::new(), config.tenancy.clone()).with_record_store(records);
    spawn_cache_sweeper(&tenancy);

    let state = AppState::new(tenancy, config.security.jwt_secret.as_str());
    let app = app(state, config);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Tenant Guard listening on http://{}", bind_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(databases) = databases {
        databases.close_all().await;
    }
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if !config.security.enable_audit_logging {
        if let Ok(directive) = format!("{}=off", AUDIT_TARGET).parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Expired resolution entries are otherwise only dropped when looked up again
fn spawn_cache_sweeper(tenancy: &Tenancy) {
    let cache = tenancy.cache().clone();
    let period = cache.ttl().max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired resolution cache entries");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
