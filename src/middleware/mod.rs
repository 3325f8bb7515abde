//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Limit request rates per client address
//! - Meter and log requests
//! - Short-circuit requests (reject unauthorized or over quota)

/// Operator token check for admin routes
pub mod admin_auth;
/// Per-IP request limits
pub mod rate_limit;
/// API key validation, quota enforcement and usage logging
pub mod quota_gate;
