//! Operator token middleware for the admin routes.
//!
//! This middleware intercepts every admin request to:
//! 1. Extract the token from the Authorization header
//! 2. Compare it with the configured `ADMIN_TOKEN`
//! 3. Reject anything else with HTTP 401

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// The configured operator token.
#[derive(Clone)]
pub struct AdminToken(Arc<str>);

impl AdminToken {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    /// Compare digests so the check does not stop at the first differing byte.
    fn matches(&self, presented: &str) -> bool {
        Sha256::digest(self.0.as_bytes()) == Sha256::digest(presented.as_bytes())
    }
}

/// Admin authentication middleware function.
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer <ADMIN_TOKEN>
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if the token matches (calls next handler)
/// - `Err(AppError::Unauthorized)` otherwise (returns 401)
pub async fn admin_auth(
    State(token): State<AdminToken>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if !token.matches(presented) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
