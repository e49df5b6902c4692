//! Structured audit events for resolution, isolation and lifecycle decisions.
//!
//! Every event is written to the `tenant_audit` tracing target at a level
//! derived from its kind, and optionally forwarded to an [`AuditSink`]
//! (tests use [`MemoryAuditSink`] to assert on what was recorded).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use super::context::ContextStore;
use super::model::{LifecycleState, TenantId};

pub const AUDIT_TARGET: &str = "tenant_audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    CacheHit,
    RegistryHit,
    NotFound,
    Suspended,
    Deleted,
    InvalidKey,
    DefaultFallback,
    RegistryUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuditSeverity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditKind {
    Resolution {
        outcome: ResolutionOutcome,
        /// Audit form of the key (claims are fingerprinted)
        routing_key: Option<String>,
        tenant_id: Option<TenantId>,
        detail: Option<String>,
    },
    CrossTenantViolation {
        surface: &'static str,
        operation: String,
        entity: String,
        record_id: Option<String>,
        context_tenant: TenantId,
        owner_tenant: Option<TenantId>,
    },
    UnscopedOperation {
        surface: &'static str,
        operation: String,
        target: String,
        rejected: bool,
    },
    ExemptOperation {
        surface: &'static str,
        operation: String,
        target: String,
    },
    Lifecycle {
        tenant_id: TenantId,
        action: String,
        from: Option<LifecycleState>,
        to: Option<LifecycleState>,
        changed: bool,
        actor: String,
        reason: Option<String>,
    },
}

impl AuditKind {
    pub fn severity(&self) -> AuditSeverity {
        match self {
            AuditKind::Resolution { outcome, .. } => match outcome {
                ResolutionOutcome::CacheHit => AuditSeverity::Debug,
                ResolutionOutcome::RegistryHit | ResolutionOutcome::DefaultFallback => AuditSeverity::Info,
                ResolutionOutcome::NotFound
                | ResolutionOutcome::Suspended
                | ResolutionOutcome::Deleted
                | ResolutionOutcome::InvalidKey => AuditSeverity::Warn,
                ResolutionOutcome::RegistryUnavailable => AuditSeverity::Error,
            },
            AuditKind::CrossTenantViolation { .. } => AuditSeverity::Error,
            AuditKind::UnscopedOperation { rejected: true, .. } => AuditSeverity::Error,
            AuditKind::UnscopedOperation { rejected: false, .. } => AuditSeverity::Debug,
            AuditKind::ExemptOperation { .. } => AuditSeverity::Warn,
            AuditKind::Lifecycle { .. } => AuditSeverity::Info,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuditKind::Resolution { .. } => "resolution",
            AuditKind::CrossTenantViolation { .. } => "cross_tenant_violation",
            AuditKind::UnscopedOperation { .. } => "unscoped_operation",
            AuditKind::ExemptOperation { .. } => "exempt_operation",
            AuditKind::Lifecycle { .. } => "lifecycle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub kind: AuditKind,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Collects events in memory
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn resolution_outcomes(&self) -> Vec<ResolutionOutcome> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match &e.kind {
                AuditKind::Resolution { outcome, .. } => Some(*outcome),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&AuditKind) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(&e.kind)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

#[derive(Clone, Default)]
pub struct AuditLog {
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self { sink: None }
    }

    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn emit(&self, kind: AuditKind) {
        let event = AuditEvent {
            at: Utc::now(),
            request_id: ContextStore::request_id(),
            kind,
        };

        let name = event.kind.name();
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| name.to_string());
        let request_id = event.request_id.as_deref().unwrap_or("-");
        match event.kind.severity() {
            AuditSeverity::Debug => {
                tracing::debug!(target: AUDIT_TARGET, event = name, request_id, audit = %payload)
            }
            AuditSeverity::Info => {
                tracing::info!(target: AUDIT_TARGET, event = name, request_id, audit = %payload)
            }
            AuditSeverity::Warn => {
                tracing::warn!(target: AUDIT_TARGET, event = name, request_id, audit = %payload)
            }
            AuditSeverity::Error => {
                tracing::error!(target: AUDIT_TARGET, event = name, request_id, audit = %payload)
            }
        }

        if let Some(sink) = &self.sink {
            sink.record(&event);
        }
    }

    pub fn resolution(
        &self,
        outcome: ResolutionOutcome,
        routing_key: Option<String>,
        tenant_id: Option<TenantId>,
        detail: Option<String>,
    ) {
        self.emit(AuditKind::Resolution { outcome, routing_key, tenant_id, detail });
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").field("sink", &self.sink.is_some()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_follows_kind() {
        let violation = AuditKind::CrossTenantViolation {
            surface: "storage",
            operation: "update".into(),
            entity: "invoices".into(),
            record_id: Some("1".into()),
            context_tenant: TenantId::new(),
            owner_tenant: Some(TenantId::new()),
        };
        assert_eq!(violation.severity(), AuditSeverity::Error);

        let exempt = AuditKind::ExemptOperation {
            surface: "storage",
            operation: "billing_rollup".into(),
            target: "invoices".into(),
        };
        assert_eq!(exempt.severity(), AuditSeverity::Warn);

        let miss = AuditKind::UnscopedOperation {
            surface: "cache",
            operation: "get".into(),
            target: "k".into(),
            rejected: false,
        };
        assert!(miss.severity() < AuditSeverity::Warn);
    }

    #[test]
    fn memory_sink_collects_events() {
        let sink = Arc::new(MemoryAuditSink::new());
        let log = AuditLog::with_sink(sink.clone());
        log.resolution(ResolutionOutcome::NotFound, Some("host:a.example.com".into()), None, None);
        log.resolution(ResolutionOutcome::CacheHit, None, Some(TenantId::new()), None);

        assert_eq!(
            sink.resolution_outcomes(),
            vec![ResolutionOutcome::NotFound, ResolutionOutcome::CacheHit]
        );
        let json = serde_json::to_value(&sink.events()[0]).unwrap();
        assert_eq!(json["event"], "resolution");
        assert_eq!(json["outcome"], "not_found");
    }
}
