// handlers/elevated/mod.rs - Elevated handlers (root JWT required)
//
// Route prefix: /api/root/*
// Middleware: jwt_auth_middleware → require_root_middleware (inserts AdminActor)

pub mod root;
