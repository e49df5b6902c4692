// handlers/elevated/root/tenant/mod.rs - Tenant lifecycle administration
//
// Every handler takes the acting admin from the verified root token and
// delegates to LifecycleController, which audits the change.

pub mod create;       // POST   /api/root/tenant
pub mod list;         // GET    /api/root/tenant
pub mod show;         // GET    /api/root/tenant/:id
pub mod update;       // PATCH  /api/root/tenant/:id
pub mod delete;       // DELETE /api/root/tenant/:id
pub mod suspend;      // POST   /api/root/tenant/:id/suspend
pub mod reactivate;   // POST   /api/root/tenant/:id/reactivate
pub mod routing_keys; // POST|DELETE /api/root/tenant/:id/routing-keys
pub mod storage;      // PUT    /api/root/tenant/:id/storage

pub use create::tenant_create;
pub use delete::tenant_delete;
pub use list::tenant_list;
pub use reactivate::tenant_reactivate;
pub use routing_keys::{routing_key_add, routing_key_remove};
pub use show::tenant_show;
pub use storage::tenant_move_storage;
pub use suspend::tenant_suspend;
pub use update::tenant_update;
