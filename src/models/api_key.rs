//! API Key model for metered access.
//!
//! API keys authenticate callers of the music API and carry their daily quota. They are stored in the database as SHA-256 hashes; the plaintext key is only shown once, when it is issued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Revoked,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown key status: {0}")]
pub struct UnknownKeyStatus(pub String);

impl TryFrom<String> for KeyStatus {
    type Error = UnknownKeyStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(KeyStatus::Active),
            "revoked" => Ok(KeyStatus::Revoked),
            _ => Err(UnknownKeyStatus(value)),
        }
    }
}

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `user_id`: Owning user, UNIQUE (one key per user)
/// - `key_hash`: SHA-256 hash of the actual API key, UNIQUE. Only used for
///   lookups inside the store, so it is not part of this struct.
/// - `key_prefix`: First characters of the key, for display
/// - `status`: `active` or `revoked`
/// - `daily_quota`, `used_today`, `total_requests`: metering counters
/// - `last_used_at`, `expires_at`: nullable timestamps
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    /// Unique identifier for this API key
    pub id: Uuid,

    /// User that owns this key
    pub user_id: Uuid,

    /// Human-readable label chosen by the owner
    pub name: String,

    /// Leading characters of the plaintext key, safe to display
    pub key_prefix: String,

    #[sqlx(try_from = "String")]
    pub status: KeyStatus,

    /// Maximum admitted requests per daily window
    pub daily_quota: i32,

    /// Requests admitted since the last daily reset
    ///
    /// Only the daily reset ever lowers this value.
    pub used_today: i32,

    /// Requests admitted over the key's whole lifetime, never reset
    pub total_requests: i64,

    pub last_used_at: Option<DateTime<Utc>>,

    /// Absolute expiry, `None` means the key never expires
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Whether the key is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Whether the daily quota has been used up.
    pub fn is_exhausted(&self) -> bool {
        self.used_today >= self.daily_quota
    }
}

/// Quota figures reported to clients that hit their daily limit.
///
/// ```json
/// { "limit": 100, "used": 100, "remaining": 0 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaReport {
    pub limit: i32,
    pub used: i32,
    pub remaining: i32,
}

impl QuotaReport {
    pub fn new(limit: i32, used: i32) -> Self {
        Self {
            limit,
            used,
            remaining: (limit - used).max(0),
        }
    }
}

/// Fields needed to insert a new key row.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub user_id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub daily_quota: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request body for provisioning a key.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "Study playlist bot",
///   "expires_at": "2027-01-01T00:00:00Z"
/// }
/// ```
///
/// Both fields are optional. The name defaults to "My API Key" and a missing
/// `expires_at` means the key never expires.
#[derive(Debug, Default, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request body for renaming a key.
#[derive(Debug, Deserialize)]
pub struct RenameApiKeyRequest {
    pub name: String,
}

/// Response body for key endpoints.
///
/// Never contains the key itself or its hash.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub key_prefix: String,
    pub status: KeyStatus,
    pub daily_quota: i32,
    pub used_today: i32,
    pub total_requests: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Convert database ApiKey to API ApiKeyResponse.
impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            user_id: key.user_id,
            name: key.name,
            key_prefix: key.key_prefix,
            status: key.status,
            daily_quota: key.daily_quota,
            used_today: key.used_today,
            total_requests: key.total_requests,
            last_used_at: key.last_used_at,
            expires_at: key.expires_at,
            created_at: key.created_at,
            updated_at: key.updated_at,
        }
    }
}

/// A freshly issued (or regenerated) key.
///
/// This is the only response that carries the plaintext `api_key`.
#[derive(Debug, Serialize)]
pub struct IssuedApiKey {
    pub api_key: String,

    #[serde(flatten)]
    pub key: ApiKeyResponse,
}
