//! Persistence seam for users, API keys and the usage log.
//!
//! The quota gate, usage recorder, reset scheduler and key management service
//! all talk to storage through [`KeyStore`]. Production uses
//! [`postgres::PgKeyStore`]; tests use an in-memory implementation with the
//! same atomicity guarantees.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    api_key::{ApiKey, NewApiKey},
    plan::Plan,
    usage::{ApiUsage, NewApiUsage, UsageFilter},
    user::{User, UserFilter},
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

/// Errors raised by a [`KeyStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// The owner already holds a key (UNIQUE on `api_keys.user_id`).
    #[error("user already owns an API key")]
    DuplicateOwner,

    /// Username or email already taken.
    #[error("username or email already registered")]
    DuplicateUser,

    /// Foreign key to `users` did not resolve.
    #[error("user does not exist")]
    UnknownUser,

    /// No connection could be obtained (pool exhausted or closed).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of the atomic check-and-increment performed on admission.
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    /// Counters were incremented; carries the updated record.
    Admitted(ApiKey),

    /// The quota was already used up; carries the current record.
    Exhausted(ApiKey),

    /// The key is no longer active (revoked or deleted concurrently).
    Inactive,
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    // Users
    async fn create_user(&self, username: &str, email: &str, plan: Plan) -> StoreResult<User>;
    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    /// One page of users, newest first, with the total matching the filter.
    async fn list_users(
        &self,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<User>, i64)>;

    /// Set the user's plan and the quota of all of their active keys in one unit.
    async fn change_plan(
        &self,
        user_id: Uuid,
        plan: Plan,
        daily_quota: i32,
    ) -> StoreResult<Option<User>>;

    /// Mark the user blocked and revoke all of their active keys in one unit.
    async fn block_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    /// Mark the user active again. Revoked keys stay revoked.
    async fn unblock_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    /// Hard delete; keys and usage rows go with the user.
    async fn delete_user(&self, user_id: Uuid) -> StoreResult<bool>;

    // Keys, always scoped to their owner
    async fn insert_key(&self, key: NewApiKey) -> StoreResult<ApiKey>;
    async fn find_key(&self, user_id: Uuid, key_id: Uuid) -> StoreResult<Option<ApiKey>>;
    async fn list_keys(&self, user_id: Uuid) -> StoreResult<Vec<ApiKey>>;
    async fn rename_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        name: &str,
    ) -> StoreResult<Option<ApiKey>>;

    /// Swap in a new token hash and set status back to `active`.
    async fn replace_key_hash(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        key_hash: &str,
        key_prefix: &str,
    ) -> StoreResult<Option<ApiKey>>;
    async fn revoke_key(&self, user_id: Uuid, key_id: Uuid) -> StoreResult<Option<ApiKey>>;
    async fn delete_key(&self, user_id: Uuid, key_id: Uuid) -> StoreResult<bool>;

    // Metering
    async fn find_active_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>>;

    /// Increment `used_today` and `total_requests` and stamp `last_used_at`,
    /// only if the key is active and `used_today < daily_quota`.
    async fn try_consume(&self, key_id: Uuid, now: DateTime<Utc>) -> StoreResult<ConsumeOutcome>;

    /// Zero `used_today` on every active key. Returns the number of keys touched.
    async fn reset_daily_usage(&self) -> StoreResult<u64>;

    async fn insert_usage(&self, usage: NewApiUsage) -> StoreResult<()>;

    /// One page of the usage log, newest first, with the total matching the filter.
    async fn list_usage(
        &self,
        filter: &UsageFilter,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<ApiUsage>, i64)>;
}
