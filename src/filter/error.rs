use thiserror::Error;

/// Rejections from the filter language. Raised before any SQL is built or
/// any row is matched, so a bad filter never reaches storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Table or schema name
    #[error("Invalid storage target: {0}")]
    InvalidTarget(String),

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Invalid WHERE clause: {0}")]
    InvalidWhereClause(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Invalid offset: {0}")]
    InvalidOffset(String),
}
