use thiserror::Error;

use super::model::TenantId;

/// Terminal outcomes of tenant resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No strategy produced an active or suspended tenant, or the match was deleted
    #[error("tenant not found")]
    TenantNotFound,

    #[error("tenant {0} is suspended")]
    TenantSuspended(TenantId),

    /// The registry could not be consulted. Retryable, and never reported as not-found.
    #[error("tenant registry unavailable: {0}")]
    RegistryUnavailable(String),
}

impl ResolveError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::RegistryUnavailable(_))
    }
}
