//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers:
//! key issuance and lifecycle, asynchronous usage logging and the daily
//! quota reset.

pub mod key_service;
pub mod reset_scheduler;
pub mod usage_recorder;
