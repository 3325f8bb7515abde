//! API usage log entries.
//!
//! One row per metered request. Rows are written once and never updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::page_window;

/// Represents an `api_usage` row.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ApiUsage {
    pub id: Uuid,
    pub api_key_id: Uuid,
    pub user_id: Uuid,

    /// Request path including the query string
    pub endpoint: String,
    pub method: String,

    /// Status code of the response sent to the caller
    pub status_code: i32,

    /// Time from request arrival to response finalization, in milliseconds
    pub response_time_ms: i32,

    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A usage record waiting to be persisted.
#[derive(Debug, Clone)]
pub struct NewApiUsage {
    pub api_key_id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub response_time_ms: i32,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Filters for the usage log, all optional.
#[derive(Debug, Clone, Default)]
pub struct UsageFilter {
    pub user_id: Option<Uuid>,

    /// Substring of the recorded endpoint
    pub endpoint: Option<String>,
    pub status_code: Option<i32>,
}

/// Query parameters for reading the usage log.
///
/// # Example
///
/// `GET /api/v1/admin/logs?user_id=...&endpoint=/songs&status_code=429&page=1&limit=50`
#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub user_id: Option<Uuid>,
    pub endpoint: Option<String>,
    pub status_code: Option<i32>,

    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}

impl UsageQuery {
    pub fn filter(&self) -> UsageFilter {
        UsageFilter {
            user_id: self.user_id,
            endpoint: self
                .endpoint
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            status_code: self.status_code,
        }
    }

    /// `(limit, offset)` of the requested page.
    pub fn window(&self) -> (i64, i64) {
        page_window(self.page, self.limit)
    }
}

/// Paginated usage log, newest first.
#[derive(Debug, Serialize)]
pub struct UsagePage {
    pub logs: Vec<ApiUsage>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}
