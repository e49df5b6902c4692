use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

use crate::tenancy::resolver::{ResolverSettings, Strategy};
use crate::tenancy::TenantId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub tenancy: TenancyConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Reject requests that match no tenant instead of using the default
    pub strict_mode: bool,
    pub default_tenant: Option<TenantId>,
    pub strategies: Vec<Strategy>,
    /// Request header carrying the tenant key for the header strategy
    pub header_name: String,
    /// JWT claim carrying the tenant key for the claim strategy
    pub claim_name: String,
    /// Resolution cache TTL; 0 disables caching
    pub cache_ttl_secs: u64,
    pub exempt_operations: Vec<String>,
    /// Database used for shared-schema tenants and exempt maintenance work
    pub shared_database: String,
}

impl TenancyConfig {
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            strict_mode: self.strict_mode,
            default_tenant: self.default_tenant,
            strategies: self.strategies.clone(),
        }
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            default_tenant: None,
            strategies: Strategy::DEFAULT_ORDER.to_vec(),
            header_name: "x-tenant-id".to_string(),
            claim_name: "tenant".to_string(),
            cache_ttl_secs: 60,
            exempt_operations: vec![],
            shared_database: "shared".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Base connection URL; the path is replaced per database
    pub url: Option<String>,
    /// Database holding the tenant registry
    pub system_database: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
    /// YAML tenant seed applied at startup
    pub seed_file: Option<String>,
    pub max_limit: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub enable_audit_logging: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("strict tenant resolution cannot be disabled in production")]
    NonStrictInProduction,

    #[error("non-strict mode requires TENANCY_DEFAULT_TENANT")]
    MissingDefaultTenant,

    #[error("at least one resolution strategy is required")]
    NoStrategies,

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Tenancy overrides
        if let Ok(v) = env::var("TENANCY_STRICT_MODE") {
            self.tenancy.strict_mode = v.parse().unwrap_or(self.tenancy.strict_mode);
        }
        if let Ok(v) = env::var("TENANCY_DEFAULT_TENANT") {
            self.tenancy.default_tenant = v.parse().ok();
        }
        if let Ok(v) = env::var("TENANCY_STRATEGIES") {
            match Strategy::parse_list(&v) {
                Ok(strategies) => self.tenancy.strategies = strategies,
                Err(e) => tracing::warn!("Ignoring TENANCY_STRATEGIES: {}", e),
            }
        }
        if let Ok(v) = env::var("TENANCY_HEADER_NAME") {
            self.tenancy.header_name = v.trim().to_ascii_lowercase();
        }
        if let Ok(v) = env::var("TENANCY_CLAIM_NAME") {
            self.tenancy.claim_name = v.trim().to_string();
        }
        if let Ok(v) = env::var("TENANCY_CACHE_TTL_SECS") {
            self.tenancy.cache_ttl_secs = v.parse().unwrap_or(self.tenancy.cache_ttl_secs);
        }
        if let Ok(v) = env::var("TENANCY_EXEMPT_OPERATIONS") {
            self.tenancy.exempt_operations = split_list(&v);
        }
        if let Ok(v) = env::var("TENANCY_SHARED_DATABASE") {
            self.tenancy.shared_database = v;
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("TENANCY_SYSTEM_DB") {
            self.database.system_database = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // API overrides
        if let Ok(v) = env::var("PORT") {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_REQUEST_TIMEOUT_SECS") {
            self.api.request_timeout_secs = v.parse().unwrap_or(self.api.request_timeout_secs);
        }
        if let Ok(v) = env::var("TENANCY_SEED_FILE") {
            self.api.seed_file = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("API_MAX_LIMIT") {
            self.api.max_limit = v.parse().ok();
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_AUDIT_LOGGING") {
            self.security.enable_audit_logging = v.parse().unwrap_or(self.security.enable_audit_logging);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }

        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tenancy.strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }
        if !self.tenancy.strict_mode {
            if self.environment == Environment::Production {
                return Err(ConfigError::NonStrictInProduction);
            }
            if self.tenancy.default_tenant.is_none() {
                return Err(ConfigError::MissingDefaultTenant);
            }
        }
        if self.tenancy.header_name.is_empty() {
            return Err(ConfigError::Invalid {
                name: "TENANCY_HEADER_NAME",
                reason: "must not be empty".to_string(),
            });
        }
        if self.environment == Environment::Production && self.security.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: "must be at least 32 bytes in production".to_string(),
            });
        }
        Ok(())
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            tenancy: TenancyConfig {
                cache_ttl_secs: 5,
                ..TenancyConfig::default()
            },
            database: DatabaseConfig {
                url: None,
                system_database: "tenant_guard".to_string(),
                max_connections: 10,
                connection_timeout: 30,
            },
            api: ApiConfig {
                port: 3000,
                request_timeout_secs: 60,
                seed_file: None,
                max_limit: Some(1000),
            },
            security: SecurityConfig {
                jwt_secret: "development-secret-change-me".to_string(),
                enable_audit_logging: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            tenancy: TenancyConfig {
                cache_ttl_secs: 30,
                ..TenancyConfig::default()
            },
            database: DatabaseConfig {
                url: None,
                system_database: "tenant_guard".to_string(),
                max_connections: 20,
                connection_timeout: 10,
            },
            api: ApiConfig {
                port: 3000,
                request_timeout_secs: 30,
                seed_file: None,
                max_limit: Some(500),
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                enable_audit_logging: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            tenancy: TenancyConfig::default(),
            database: DatabaseConfig {
                url: None,
                system_database: "tenant_guard".to_string(),
                max_connections: 50,
                connection_timeout: 5,
            },
            api: ApiConfig {
                port: 3000,
                request_timeout_secs: 15,
                seed_file: None,
                max_limit: Some(100),
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                enable_audit_logging: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

// Helper macros for common checks
#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(config.tenancy.strict_mode);
        assert_eq!(config.tenancy.header_name, "x-tenant-id");
        assert_eq!(config.tenancy.strategies, Strategy::DEFAULT_ORDER.to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_production_config() {
        let mut config = AppConfig::production();
        assert_eq!(config.api.max_limit, Some(100));
        // no secret configured yet
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { name: "JWT_SECRET", .. })));

        config.security.jwt_secret = "x".repeat(32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn production_refuses_non_strict_mode() {
        let mut config = AppConfig::production();
        config.security.jwt_secret = "x".repeat(32);
        config.tenancy.strict_mode = false;
        config.tenancy.default_tenant = Some(TenantId::new());
        assert_eq!(config.validate(), Err(ConfigError::NonStrictInProduction));
    }

    #[test]
    fn non_strict_requires_default_tenant() {
        let mut config = AppConfig::development();
        config.tenancy.strict_mode = false;
        assert_eq!(config.validate(), Err(ConfigError::MissingDefaultTenant));
        config.tenancy.default_tenant = Some(TenantId::new());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn splits_lists() {
        assert_eq!(split_list(" a, ,b "), vec!["a".to_string(), "b".to_string()]);
    }
}
