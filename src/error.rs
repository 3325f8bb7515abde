//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{models::api_key::QuotaReport, store::StoreError};

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Credential Errors**: missing, invalid, revoked or expired API keys
/// - **Quota Errors**: daily limit reached, or per-IP rate limit hit
/// - **Storage Errors**: key store or database failures (never detailed to clients)
/// - **Admin Errors**: bad operator token, unknown resources, conflicts, invalid input
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Key store operation failed.
    ///
    /// Returns HTTP 500 with a generic message; the detail is only logged.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Direct database query failed (downstream handlers).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No `x-api-key` header, or an empty one.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Access denied. No API key found in the x-api-key header.")]
    MissingApiKey,

    /// Key unknown or revoked. Both cases look the same to the caller.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("API key is invalid or has been revoked.")]
    InvalidApiKey,

    /// Key matched but is past its expiry.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("API key has expired.")]
    ExpiredApiKey,

    /// Key is valid but its daily quota is used up.
    ///
    /// Returns HTTP 429 Too Many Requests with the quota figures.
    #[error("Daily quota exceeded. Your limit is {} requests per day.", .0.limit)]
    QuotaExceeded(QuotaReport),

    /// Too many requests from one client address.
    ///
    /// Returns HTTP 429 Too Many Requests.
    #[error("{0}")]
    RateLimited(&'static str),

    /// Missing or wrong operator token on admin routes.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid admin token")]
    Unauthorized,

    /// Returns HTTP 404 Not Found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Returns HTTP 409 Conflict.
    #[error("{0}")]
    Conflict(String),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("{0}")]
    InvalidRequest(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Storage(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MissingApiKey | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::InvalidApiKey | AppError::ExpiredApiKey => StatusCode::FORBIDDEN,
            AppError::QuotaExceeded(_) | AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "success": false,
///   "message": "Human-readable error message"
/// }
/// ```
///
/// `QuotaExceeded` adds `"quota": { "limit": 100, "used": 100, "remaining": 0 }`.
/// Storage and database errors are logged and replaced by a generic message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match self {
            AppError::Storage(ref e) => {
                tracing::error!(error = %e, "Key store failure");
                json!({ "success": false, "message": "Internal server error" })
            }
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "Database failure");
                json!({ "success": false, "message": "Internal server error" })
            }
            AppError::QuotaExceeded(quota) => json!({
                "success": false,
                "message": self.to_string(),
                "quota": quota,
            }),
            _ => json!({ "success": false, "message": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
