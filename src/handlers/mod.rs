//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Calls into the services or runs its query
//! 3. Returns HTTP response (JSON, status code)

/// User and API key administration
pub mod admin;
/// Extractors with JSON error envelopes
pub mod extract;
/// Liveness and database connectivity
pub mod health;
/// Metered song catalogue
pub mod songs;
