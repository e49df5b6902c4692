// handlers/tenant/mod.rs - Tenant-scoped handlers
//
// Every route here runs behind resolve_tenant_middleware, so the tenant
// context is installed before the handler is polled.

pub mod whoami;

pub use whoami::whoami_get;
