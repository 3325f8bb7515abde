//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response bodies built from them.

/// API key model and metering counters
pub mod api_key;
/// Subscription plans and quota table
pub mod plan;
/// Song catalogue model
pub mod song;
/// Usage log model
pub mod usage;
/// User model
pub mod user;

use serde::Serialize;

/// Largest page a caller may request from any listing.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Turn a 1-based `page` and a requested page size into `(limit, offset)`.
///
/// The size is clamped to `1..=MAX_PAGE_SIZE`, pages below 1 mean the first
/// page, and the offset saturates instead of overflowing.
pub fn page_window(page: i64, limit: i64) -> (i64, i64) {
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    (limit, (page.max(1) - 1).saturating_mul(limit))
}

/// Success envelope shared by every JSON endpoint.
///
/// ```json
/// { "success": true, "data": { ... } }
/// ```
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
