// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::database::DatabaseError;
use crate::isolation::{CacheError, IsolationError, StorageError};
use crate::tenancy::lifecycle::LifecycleError;
use crate::tenancy::registry::RegistryError;
use crate::tenancy::routing::RoutingKeyError;
use crate::tenancy::{ContextError, DispatchError, ResolveError};

/// Seconds a client should wait before retrying after the registry was unreachable
pub const REGISTRY_RETRY_AFTER_SECS: u64 = 5;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),
    CrossTenantViolation(String),

    // 404 Not Found
    NotFound(String),
    TenantNotFound(String),

    // 409 Conflict
    Conflict(String),
    InvalidLifecycleTransition(String),

    // 410 Gone
    TenantSuspended(String),

    // 500 Internal Server Error
    InternalServerError(String),
    UnscopedOperation(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
    RegistryUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::CrossTenantViolation(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::TenantNotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InvalidLifecycleTransition(_) => 409,
            ApiError::TenantSuspended(_) => 410,
            ApiError::InternalServerError(_) => 500,
            ApiError::UnscopedOperation(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::RegistryUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::CrossTenantViolation(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::TenantNotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InvalidLifecycleTransition(msg) => msg,
            ApiError::TenantSuspended(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::UnscopedOperation(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
            ApiError::RegistryUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::CrossTenantViolation(_) => "CROSS_TENANT_VIOLATION",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::TenantNotFound(_) => "TENANT_NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InvalidLifecycleTransition(_) => "INVALID_LIFECYCLE_TRANSITION",
            ApiError::TenantSuspended(_) => "TENANT_SUSPENDED",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::UnscopedOperation(_) => "UNSCOPED_OPERATION",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::RegistryUnavailable(_) => "REGISTRY_UNAVAILABLE",
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::RegistryUnavailable(_) => Some(REGISTRY_RETRY_AFTER_SECS),
            _ => None,
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::TenantNotFound => ApiError::TenantNotFound("Tenant not found".to_string()),
            ResolveError::TenantSuspended(_) => ApiError::TenantSuspended("Tenant is suspended".to_string()),
            ResolveError::RegistryUnavailable(msg) => {
                tracing::error!("Tenant registry unavailable: {}", msg);
                ApiError::RegistryUnavailable("Tenant registry temporarily unavailable".to_string())
            }
        }
    }
}

impl From<IsolationError> for ApiError {
    fn from(err: IsolationError) -> Self {
        match err {
            IsolationError::Unscoped { operation, target } => {
                tracing::error!("Unscoped operation '{}' on '{}'", operation, target);
                ApiError::UnscopedOperation("Operation requires a tenant context".to_string())
            }
            IsolationError::CrossTenantViolation { .. } => {
                // Details are in the audit log, not the response
                ApiError::CrossTenantViolation("Access to this record is not allowed".to_string())
            }
            IsolationError::ExemptionDenied(op) => {
                ApiError::forbidden(format!("Operation '{}' is not exempt from tenant scoping", op))
            }
            IsolationError::Storage(e) => e.into(),
            IsolationError::Cache(e) => e.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Filter(e) => ApiError::bad_request(e.to_string()),
            StorageError::NotFound { entity, id } => ApiError::not_found(format!("{} {} not found", entity, id)),
            StorageError::Conflict(msg) => ApiError::conflict(msg),
            StorageError::InvalidRecord(msg) => ApiError::bad_request(msg),
            StorageError::Database(e) => e.into(),
            StorageError::Sqlx(e) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", e);
                ApiError::internal_server_error("Database error occurred")
            }
            StorageError::Serialization(e) => {
                tracing::error!("Record serialization error: {}", e);
                ApiError::internal_server_error("Failed to read stored record")
            }
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        tracing::error!("Cache error: {}", err);
        ApiError::service_unavailable("Cache temporarily unavailable")
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Sqlx(sqlx_err) => {
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            other => {
                tracing::error!("Database configuration error: {}", other);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unavailable(msg) => {
                tracing::error!("Tenant registry unavailable: {}", msg);
                ApiError::RegistryUnavailable("Tenant registry temporarily unavailable".to_string())
            }
            RegistryError::NotFound(id) => ApiError::TenantNotFound(format!("Tenant {} not found", id)),
            RegistryError::AlreadyExists(_)
            | RegistryError::RoutingKeyTaken(_)
            | RegistryError::VersionConflict { .. } => ApiError::conflict(err.to_string()),
            RegistryError::Invalid(msg) => {
                tracing::error!("Invalid tenant record: {}", msg);
                ApiError::internal_server_error("Tenant record could not be read")
            }
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Transition(e) => ApiError::InvalidLifecycleTransition(e.to_string()),
            LifecycleError::Deleted(_) => ApiError::InvalidLifecycleTransition(err.to_string()),
            LifecycleError::Registry(e) => e.into(),
            LifecycleError::Validation(msg) => ApiError::validation_error(msg, None),
        }
    }
}

impl From<RoutingKeyError> for ApiError {
    fn from(err: RoutingKeyError) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert("routing_key".to_string(), err.to_string());
        ApiError::validation_error("Invalid routing key", Some(field_errors))
    }
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        tracing::error!("Tenant context error: {}", err);
        ApiError::internal_server_error("An error occurred while processing your request")
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Resolve(e) => e.into(),
            DispatchError::Context(e) => e.into(),
            DispatchError::Isolation(e) => e.into(),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.to_json())).into_response();
        if let Some(secs) = self.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
