//! Tenant resolution.
//!
//! Strategies run in configured order. Each one either has no input on the
//! request, produces a malformed key (audited, skipped) or produces a valid
//! routing key which is looked up through the resolution cache and then the
//! registry.
//!
//! A key that maps to no tenant lets the chain continue. A key that maps to a
//! suspended tenant stops with `TenantSuspended`; a key that maps to a
//! deleted tenant stops with `TenantNotFound` and never falls through to the
//! default tenant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::audit::{AuditLog, ResolutionOutcome};
use super::cache::{CacheKey, CachedTenant, ResolutionCache};
use super::context::{ContextOrigin, TenantContext};
use super::error::ResolveError;
use super::model::{LifecycleState, StorageTarget, TenantId};
use super::registry::{RegistryError, TenantRegistry};
use super::routing::{RoutingKey, RoutingKeyError, RoutingKeyKind};

/// Raw request inputs the strategies read from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressingInfo {
    pub host: Option<String>,
    pub path: Option<String>,
    pub header: Option<String>,
    /// Tenant claim from an already verified identity
    pub claim: Option<String>,
}

impl AddressingInfo {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn claim(mut self, claim: impl Into<String>) -> Self {
        self.claim = Some(claim.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Host,
    PathPrefix,
    Header,
    Claim,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    NoInput,
    Invalid(RoutingKeyError),
    Key(RoutingKey),
}

impl Strategy {
    pub const DEFAULT_ORDER: [Strategy; 4] =
        [Strategy::Host, Strategy::PathPrefix, Strategy::Header, Strategy::Claim];

    pub fn kind(&self) -> RoutingKeyKind {
        match self {
            Strategy::Host => RoutingKeyKind::Host,
            Strategy::PathPrefix => RoutingKeyKind::PathPrefix,
            Strategy::Header => RoutingKeyKind::Header,
            Strategy::Claim => RoutingKeyKind::Claim,
        }
    }

    pub fn attempt(&self, info: &AddressingInfo) -> Attempt {
        let raw = match self {
            Strategy::Host => info.host.as_deref(),
            // Only the first path segment addresses a tenant
            Strategy::PathPrefix => info
                .path
                .as_deref()
                .and_then(|p| p.trim_start_matches('/').split('/').next()),
            Strategy::Header => info.header.as_deref(),
            Strategy::Claim => info.claim.as_deref(),
        };

        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Attempt::NoInput,
            Some(raw) => match RoutingKey::parse(self.kind(), raw) {
                Ok(key) => Attempt::Key(key),
                Err(err) => Attempt::Invalid(err),
            },
        }
    }

    /// Parse a comma separated list such as `host,path,header,claim`
    pub fn parse_list(raw: &str) -> Result<Vec<Strategy>, String> {
        let mut out: Vec<Strategy> = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let strategy: Strategy = part.parse()?;
            if !out.contains(&strategy) {
                out.push(strategy);
            }
        }
        if out.is_empty() {
            return Err("at least one resolution strategy is required".to_string());
        }
        Ok(out)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" | "subdomain" => Ok(Strategy::Host),
            "path" | "path_prefix" => Ok(Strategy::PathPrefix),
            "header" => Ok(Strategy::Header),
            "claim" | "token" => Ok(Strategy::Claim),
            other => Err(format!("unknown resolution strategy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "strategy", rename_all = "snake_case")]
pub enum ResolutionSource {
    Strategy(Strategy),
    Default,
    Direct,
}

/// Successful resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTenant {
    pub tenant_id: TenantId,
    pub tenant_name: String,
    pub storage_target: StorageTarget,
    pub source: ResolutionSource,
    #[serde(skip)]
    pub routing_key: Option<RoutingKey>,
    pub cached: bool,
}

impl ResolvedTenant {
    pub fn context(&self, origin: ContextOrigin) -> TenantContext {
        TenantContext::new(self.tenant_id, self.tenant_name.clone(), self.storage_target.clone(), origin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    pub strict_mode: bool,
    pub default_tenant: Option<TenantId>,
    pub strategies: Vec<Strategy>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            strict_mode: true,
            default_tenant: None,
            strategies: Strategy::DEFAULT_ORDER.to_vec(),
        }
    }
}

pub struct Resolver {
    registry: Arc<dyn TenantRegistry>,
    cache: Arc<ResolutionCache>,
    audit: AuditLog,
    settings: ResolverSettings,
}

impl Resolver {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        cache: Arc<ResolutionCache>,
        audit: AuditLog,
        settings: ResolverSettings,
    ) -> Self {
        Self { registry, cache, audit, settings }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub async fn resolve(&self, info: &AddressingInfo) -> Result<ResolvedTenant, ResolveError> {
        for strategy in &self.settings.strategies {
            let key = match strategy.attempt(info) {
                Attempt::NoInput => continue,
                Attempt::Invalid(err) => {
                    self.audit.resolution(
                        ResolutionOutcome::InvalidKey,
                        Some(strategy.kind().to_string()),
                        None,
                        Some(err.to_string()),
                    );
                    continue;
                }
                Attempt::Key(key) => key,
            };

            let repr = key.audit_repr();
            match self.lookup(CacheKey::Route(key.clone()), &repr).await? {
                None => {
                    self.audit.resolution(ResolutionOutcome::NotFound, Some(repr), None, None);
                    continue;
                }
                Some((entry, cached)) => {
                    let source = ResolutionSource::Strategy(*strategy);
                    return self.admit(entry, cached, source, Some(key), repr);
                }
            }
        }

        self.fallback().await
    }

    /// Resolve a known tenant id, for work that does not arrive as a request
    pub async fn resolve_id(&self, tenant_id: TenantId) -> Result<ResolvedTenant, ResolveError> {
        let repr = format!("id:{}", tenant_id);
        match self.lookup(CacheKey::Id(tenant_id), &repr).await? {
            Some((entry, cached)) => self.admit(entry, cached, ResolutionSource::Direct, None, repr),
            None => {
                self.audit
                    .resolution(ResolutionOutcome::NotFound, Some(repr), Some(tenant_id), None);
                Err(ResolveError::TenantNotFound)
            }
        }
    }

    async fn fallback(&self) -> Result<ResolvedTenant, ResolveError> {
        let default = match (self.settings.strict_mode, self.settings.default_tenant) {
            (false, Some(default)) => default,
            _ => {
                self.audit.resolution(
                    ResolutionOutcome::NotFound,
                    None,
                    None,
                    Some("no strategy matched".to_string()),
                );
                return Err(ResolveError::TenantNotFound);
            }
        };

        let repr = format!("default:{}", default);
        match self.lookup(CacheKey::Id(default), &repr).await? {
            Some((entry, cached)) if entry.state == LifecycleState::Active => {
                self.audit
                    .resolution(ResolutionOutcome::DefaultFallback, Some(repr), Some(entry.tenant_id), None);
                Ok(resolved(entry, cached, ResolutionSource::Default, None))
            }
            Some((entry, cached)) => self.admit(entry, cached, ResolutionSource::Default, None, repr),
            None => {
                tracing::error!("Configured default tenant {} does not exist", default);
                self.audit.resolution(
                    ResolutionOutcome::NotFound,
                    Some(repr),
                    Some(default),
                    Some("default tenant missing".to_string()),
                );
                Err(ResolveError::TenantNotFound)
            }
        }
    }

    fn admit(
        &self,
        entry: CachedTenant,
        cached: bool,
        source: ResolutionSource,
        key: Option<RoutingKey>,
        repr: String,
    ) -> Result<ResolvedTenant, ResolveError> {
        let tenant_id = entry.tenant_id;
        match entry.state {
            LifecycleState::Active => {
                let outcome = if cached { ResolutionOutcome::CacheHit } else { ResolutionOutcome::RegistryHit };
                self.audit.resolution(outcome, Some(repr), Some(tenant_id), None);
                Ok(resolved(entry, cached, source, key))
            }
            LifecycleState::Suspended => {
                self.audit
                    .resolution(ResolutionOutcome::Suspended, Some(repr), Some(tenant_id), None);
                Err(ResolveError::TenantSuspended(tenant_id))
            }
            LifecycleState::Deleted => {
                self.audit
                    .resolution(ResolutionOutcome::Deleted, Some(repr), Some(tenant_id), None);
                Err(ResolveError::TenantNotFound)
            }
        }
    }

    /// Cache first, then a registry read whose result populates the cache
    async fn lookup(&self, key: CacheKey, repr: &str) -> Result<Option<(CachedTenant, bool)>, ResolveError> {
        if let Some(entry) = self.cache.get(&key) {
            return Ok(Some((entry, true)));
        }

        let ticket = self.cache.ticket();
        let found = match &key {
            CacheKey::Route(route) => self.registry.find_by_routing_key(route).await,
            CacheKey::Id(id) => self.registry.get(*id).await,
        };

        let tenant = match found {
            Ok(tenant) => tenant,
            Err(err) => {
                let detail = match &err {
                    RegistryError::Unavailable(msg) => msg.clone(),
                    other => other.to_string(),
                };
                self.audit.resolution(
                    ResolutionOutcome::RegistryUnavailable,
                    Some(repr.to_string()),
                    None,
                    Some(detail.clone()),
                );
                return Err(ResolveError::RegistryUnavailable(detail));
            }
        };

        Ok(tenant.map(|tenant| {
            let entry = CachedTenant::from(&tenant);
            self.cache.insert(key, entry.clone(), ticket);
            (entry, false)
        }))
    }
}

fn resolved(
    entry: CachedTenant,
    cached: bool,
    source: ResolutionSource,
    routing_key: Option<RoutingKey>,
) -> ResolvedTenant {
    ResolvedTenant {
        tenant_id: entry.tenant_id,
        tenant_name: entry.tenant_name,
        storage_target: entry.storage_target,
        source,
        routing_key,
        cached,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::audit::MemoryAuditSink;
    use crate::tenancy::model::{NewTenant, Tenant};
    use crate::tenancy::registry::InMemoryRegistry;
    use std::time::Duration;

    struct Fixture {
        registry: Arc<InMemoryRegistry>,
        cache: Arc<ResolutionCache>,
        sink: Arc<MemoryAuditSink>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: Arc::new(InMemoryRegistry::new()),
                cache: Arc::new(ResolutionCache::new(Duration::from_secs(30))),
                sink: Arc::new(MemoryAuditSink::new()),
            }
        }

        fn resolver(&self, settings: ResolverSettings) -> Resolver {
            Resolver::new(
                self.registry.clone(),
                self.cache.clone(),
                AuditLog::with_sink(self.sink.clone()),
                settings,
            )
        }

        async fn tenant(&self, name: &str, keys: &[&str]) -> Tenant {
            let mut new = NewTenant::new(name, StorageTarget::new("shared"));
            for key in keys {
                new = new.routing_key(key.parse().unwrap());
            }
            self.registry.insert(new).await.unwrap()
        }

        async fn set_state(&self, id: TenantId, state: LifecycleState) {
            let mut tenant = self.registry.get(id).await.unwrap().unwrap();
            tenant.state = state;
            let _guard = self.cache.begin_mutation(id);
            self.registry.save(&tenant).await.unwrap();
        }
    }

    #[test]
    fn strategies_extract_keys() {
        let info = AddressingInfo::default().host("Acme.Example.com:443").path("/acme/invoices");
        assert_eq!(
            Strategy::Host.attempt(&info),
            Attempt::Key(RoutingKey::host("acme.example.com").unwrap())
        );
        assert_eq!(
            Strategy::PathPrefix.attempt(&info),
            Attempt::Key(RoutingKey::path_prefix("acme").unwrap())
        );
        assert_eq!(Strategy::Header.attempt(&info), Attempt::NoInput);
        assert!(matches!(
            Strategy::Host.attempt(&AddressingInfo::default().host("127.0.0.1")),
            Attempt::Invalid(_)
        ));
    }

    #[test]
    fn parses_strategy_lists() {
        assert_eq!(
            Strategy::parse_list("header, claim,header").unwrap(),
            vec![Strategy::Header, Strategy::Claim]
        );
        assert!(Strategy::parse_list("cookie").is_err());
        assert!(Strategy::parse_list(" , ").is_err());
    }

    #[tokio::test]
    async fn resolves_in_strategy_order_and_caches() {
        let fx = Fixture::new();
        let acme = fx.tenant("Acme", &["host:acme.example.com"]).await;
        let globex = fx.tenant("Globex", &["header:globex"]).await;
        let resolver = fx.resolver(ResolverSettings::default());

        let info = AddressingInfo::default().host("acme.example.com").header("globex");
        let first = resolver.resolve(&info).await.unwrap();
        assert_eq!(first.tenant_id, acme.id);
        assert_eq!(first.source, ResolutionSource::Strategy(Strategy::Host));
        assert!(!first.cached);

        let second = resolver.resolve(&info).await.unwrap();
        assert!(second.cached);
        assert_eq!(fx.registry.lookups(), 1);

        // Unknown host continues to the header strategy
        let info = AddressingInfo::default().host("nobody.example.com").header("globex");
        assert_eq!(resolver.resolve(&info).await.unwrap().tenant_id, globex.id);
        assert_eq!(
            fx.sink.resolution_outcomes(),
            vec![
                ResolutionOutcome::RegistryHit,
                ResolutionOutcome::CacheHit,
                ResolutionOutcome::NotFound,
                ResolutionOutcome::RegistryHit,
            ]
        );
    }

    #[tokio::test]
    async fn invalid_keys_are_audited_and_skipped() {
        let fx = Fixture::new();
        let acme = fx.tenant("Acme", &["header:acme"]).await;
        let resolver = fx.resolver(ResolverSettings::default());

        let info = AddressingInfo::default().host("*.example.com").header("acme");
        assert_eq!(resolver.resolve(&info).await.unwrap().tenant_id, acme.id);
        assert_eq!(fx.sink.resolution_outcomes()[0], ResolutionOutcome::InvalidKey);
    }

    #[tokio::test]
    async fn suspended_and_deleted_tenants_stop_the_chain() {
        let fx = Fixture::new();
        let acme = fx.tenant("Acme", &["host:acme.example.com"]).await;
        let globex = fx.tenant("Globex", &["header:globex"]).await;
        let resolver = fx.resolver(ResolverSettings {
            strict_mode: false,
            default_tenant: Some(globex.id),
            ..ResolverSettings::default()
        });
        let info = AddressingInfo::default().host("acme.example.com").header("globex");

        fx.set_state(acme.id, LifecycleState::Suspended).await;
        assert_eq!(resolver.resolve(&info).await, Err(ResolveError::TenantSuspended(acme.id)));

        fx.set_state(acme.id, LifecycleState::Deleted).await;
        assert_eq!(resolver.resolve(&info).await, Err(ResolveError::TenantNotFound));
    }

    #[tokio::test]
    async fn strict_mode_fails_closed_and_lenient_mode_falls_back() {
        let fx = Fixture::new();
        let fallback = fx.tenant("Fallback", &["header:fallback"]).await;
        let info = AddressingInfo::default().host("nobody.example.com");

        let strict = fx.resolver(ResolverSettings {
            strict_mode: true,
            default_tenant: Some(fallback.id),
            ..ResolverSettings::default()
        });
        assert_eq!(strict.resolve(&info).await, Err(ResolveError::TenantNotFound));

        let lenient = fx.resolver(ResolverSettings {
            strict_mode: false,
            default_tenant: Some(fallback.id),
            ..ResolverSettings::default()
        });
        let resolved = lenient.resolve(&info).await.unwrap();
        assert_eq!(resolved.tenant_id, fallback.id);
        assert_eq!(resolved.source, ResolutionSource::Default);
        assert!(fx.sink.resolution_outcomes().contains(&ResolutionOutcome::DefaultFallback));
    }

    #[tokio::test]
    async fn registry_outage_is_not_reported_as_not_found() {
        let fx = Fixture::new();
        fx.tenant("Acme", &["host:acme.example.com"]).await;
        let resolver = fx.resolver(ResolverSettings::default());
        fx.registry.set_available(false);

        let result = resolver
            .resolve(&AddressingInfo::default().host("acme.example.com"))
            .await;
        assert!(matches!(result, Err(ResolveError::RegistryUnavailable(_))));
        assert_eq!(
            fx.sink.resolution_outcomes(),
            vec![ResolutionOutcome::RegistryUnavailable]
        );
    }

    #[tokio::test]
    async fn resolve_id_respects_lifecycle() {
        let fx = Fixture::new();
        let acme = fx.tenant("Acme", &["header:acme"]).await;
        let resolver = fx.resolver(ResolverSettings::default());

        assert_eq!(resolver.resolve_id(acme.id).await.unwrap().source, ResolutionSource::Direct);
        fx.set_state(acme.id, LifecycleState::Suspended).await;
        assert_eq!(resolver.resolve_id(acme.id).await, Err(ResolveError::TenantSuspended(acme.id)));
        assert_eq!(resolver.resolve_id(TenantId::new()).await, Err(ResolveError::TenantNotFound));
    }
}
