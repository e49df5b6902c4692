// handlers/mod.rs - HTTP handlers by access tier
//
// Public (no auth)             → /health
// Tenant-scoped (resolved)     → /api/tenant/*, /t/:tenant/api/tenant/*
// Elevated (root JWT required) → /api/root/*

pub mod elevated;
pub mod health;
pub mod tenant;
