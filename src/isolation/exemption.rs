use std::collections::BTreeSet;
use std::sync::Arc;

use super::IsolationError;

/// Permission to run one named maintenance operation across all tenants.
///
/// Only [`ExemptionPolicy::grant`] can produce one, so holding an `Exemption`
/// proves the operation was on the configured allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exemption {
    operation: Arc<str>,
}

impl Exemption {
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// Allow-list of operations that may bypass tenant scoping
#[derive(Debug, Clone, Default)]
pub struct ExemptionPolicy {
    allowed: BTreeSet<String>,
}

impl ExemptionPolicy {
    pub fn new<I, S>(operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = operations
            .into_iter()
            .map(|op| op.as_ref().trim().to_string())
            .filter(|op| !op.is_empty())
            .collect();
        Self { allowed }
    }

    /// Parse a comma separated list, e.g. `TENANCY_EXEMPT_OPERATIONS`
    pub fn from_list(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn is_allowed(&self, operation: &str) -> bool {
        self.allowed.contains(operation)
    }

    pub fn grant(&self, operation: &str) -> Result<Exemption, IsolationError> {
        if !self.is_allowed(operation) {
            tracing::warn!(operation, "exemption refused for operation not on the allow-list");
            return Err(IsolationError::ExemptionDenied(operation.to_string()));
        }
        Ok(Exemption {
            operation: Arc::from(operation),
        })
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_only_listed_operations() {
        let policy = ExemptionPolicy::from_list(" usage_report, ,purge_expired_sessions ");
        assert_eq!(policy.operations().collect::<Vec<_>>(), vec!["purge_expired_sessions", "usage_report"]);

        let exemption = policy.grant("usage_report").unwrap();
        assert_eq!(exemption.operation(), "usage_report");

        assert!(matches!(
            policy.grant("drop_everything"),
            Err(IsolationError::ExemptionDenied(op)) if op == "drop_everything"
        ));
        assert!(ExemptionPolicy::default().grant("").is_err());
    }
}
