//! User model and admin request types.
//!
//! Users own API keys. Registration and login are handled elsewhere; this
//! service only needs enough of the user to know which plan (and therefore
//! which daily quota) applies to their keys, and whether they are blocked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{api_key::ApiKeyResponse, page_window, plan::Plan};

/// Account status of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,

    /// Blocked users have every key revoked and cannot get new ones.
    Blocked,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown user status: {0}")]
pub struct UnknownUserStatus(pub String);

impl TryFrom<String> for UserStatus {
    type Error = UnknownUserStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(UserStatus::Active),
            "blocked" => Ok(UserStatus::Blocked),
            _ => Err(UnknownUserStatus(value)),
        }
    }
}

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table. Deleting a user cascades to its API keys
/// and to every usage row referencing them.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: Uuid,

    /// Unique login name
    pub username: String,

    /// Unique contact address
    pub email: String,

    /// Subscription plan, selects the daily quota of the user's keys
    #[sqlx(try_from = "String")]
    pub plan: Plan,

    #[sqlx(try_from = "String")]
    pub status: UserStatus,

    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_blocked(&self) -> bool {
        self.status == UserStatus::Blocked
    }
}

/// Request body for creating a user.
///
/// # JSON Example
///
/// ```json
/// {
///   "username": "lofi-dev",
///   "email": "dev@example.com",
///   "plan": "pro"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,

    /// Defaults to `free` if not provided
    #[serde(default)]
    pub plan: Plan,
}

/// Request body for changing a user's plan.
#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan: Plan,
}

/// Filters for the user listing, all optional.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive match against username or email
    pub search: Option<String>,
    pub plan: Option<Plan>,
    pub status: Option<UserStatus>,
}

/// Query parameters for listing users.
///
/// # Example
///
/// `GET /api/v1/admin/users?search=lofi&plan=pro&status=active&page=1&limit=10`
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub plan: Option<Plan>,
    pub status: Option<UserStatus>,

    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

impl UserQuery {
    pub fn filter(&self) -> UserFilter {
        UserFilter {
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            plan: self.plan,
            status: self.status,
        }
    }

    /// `(limit, offset)` of the requested page.
    pub fn window(&self) -> (i64, i64) {
        page_window(self.page, self.limit)
    }
}

/// Paginated user listing.
#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

/// A user together with their keys.
#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,

    pub api_keys: Vec<ApiKeyResponse>,
}
