//! Key management service - users, plans and the API key lifecycle.
//!
//! This service handles:
//! - Creating, listing and blocking users, and changing their plan (which
//!   re-quotas their active keys)
//! - Provisioning the single API key a user may hold
//! - Renaming, regenerating, revoking and deleting keys
//! - Reading the usage log
//!
//! # Key Format
//!
//! `mk_` followed by 64 hex characters (32 random bytes). Only the SHA-256 hash
//! of the key is stored; the plaintext is returned once, when it is issued.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        api_key::{ApiKey, CreateApiKeyRequest, IssuedApiKey, NewApiKey},
        plan::{Plan, PlanQuotas},
        usage::{UsagePage, UsageQuery},
        user::{CreateUserRequest, User, UserDetail, UserPage, UserQuery},
    },
    store::{KeyStore, StoreError},
};

const KEY_PREFIX: &str = "mk_";
const DISPLAY_PREFIX_LEN: usize = 11;
const DEFAULT_KEY_NAME: &str = "My API Key";

/// Generate a new plaintext API key.
pub fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{}{}", KEY_PREFIX, hex::encode(bytes))
}

/// SHA-256 hex digest of a plaintext key, as stored in `api_keys.key_hash`.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn display_prefix(api_key: &str) -> String {
    api_key.chars().take(DISPLAY_PREFIX_LEN).collect()
}

fn ensure_not_blocked(user: &User) -> Result<(), AppError> {
    if user.is_blocked() {
        return Err(AppError::Conflict("User is blocked".to_string()));
    }
    Ok(())
}

fn issue(api_key: String, record: ApiKey) -> IssuedApiKey {
    IssuedApiKey {
        api_key,
        key: record.into(),
    }
}

/// Create a user.
///
/// # Errors
///
/// - `InvalidRequest`: blank username or email
/// - `Conflict`: username or email already registered
pub async fn create_user(store: &dyn KeyStore, request: CreateUserRequest) -> Result<User, AppError> {
    let username = request.username.trim();
    let email = request.email.trim();
    if username.is_empty() || email.is_empty() {
        return Err(AppError::InvalidRequest(
            "Username and email are required".to_string(),
        ));
    }

    store
        .create_user(username, email, request.plan)
        .await
        .map_err(|e| match e {
            StoreError::DuplicateUser => {
                AppError::Conflict("Username or email already registered".to_string())
            }
            other => other.into(),
        })
}

/// One page of users matching the query, newest first.
pub async fn list_users(store: &dyn KeyStore, query: &UserQuery) -> Result<UserPage, AppError> {
    let (limit, offset) = query.window();
    let (users, total) = store.list_users(&query.filter(), limit, offset).await?;

    Ok(UserPage {
        users,
        page: query.page.max(1),
        limit,
        total,
    })
}

/// A user with their keys.
pub async fn get_user(store: &dyn KeyStore, user_id: Uuid) -> Result<UserDetail, AppError> {
    let user = store
        .find_user(user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    let keys = store.list_keys(user_id).await?;

    Ok(UserDetail {
        user,
        api_keys: keys.into_iter().map(Into::into).collect(),
    })
}

/// Block a user. Their active keys are revoked in the same write.
pub async fn block_user(store: &dyn KeyStore, user_id: Uuid) -> Result<User, AppError> {
    let user = store
        .block_user(user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    tracing::warn!(%user_id, "User blocked, active API keys revoked");
    Ok(user)
}

/// Lift a block. Revoked keys stay revoked until regenerated.
pub async fn unblock_user(store: &dyn KeyStore, user_id: Uuid) -> Result<User, AppError> {
    let user = store
        .unblock_user(user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    tracing::info!(%user_id, "User unblocked");
    Ok(user)
}

/// Move a user to another plan and apply that plan's quota to their active keys.
pub async fn change_plan(
    store: &dyn KeyStore,
    quotas: &PlanQuotas,
    user_id: Uuid,
    plan: Plan,
) -> Result<User, AppError> {
    let user = store
        .change_plan(user_id, plan, quotas.daily_quota(plan))
        .await?
        .ok_or(AppError::NotFound("User"))?;

    tracing::info!(%user_id, plan = plan.as_str(), "User plan updated");
    Ok(user)
}

/// Delete a user together with their keys and usage history.
pub async fn delete_user(store: &dyn KeyStore, user_id: Uuid) -> Result<(), AppError> {
    if !store.delete_user(user_id).await? {
        return Err(AppError::NotFound("User"));
    }
    Ok(())
}

/// Provision the user's API key.
///
/// # Process
///
/// 1. Look up the user to find their plan
/// 2. Generate a key and hash it
/// 3. Insert the row; the UNIQUE owner constraint rejects a second key
///
/// # Errors
///
/// - `NotFound`: user does not exist
/// - `Conflict`: user is blocked, or already holds a key (regenerate it instead)
/// - `InvalidRequest`: `expires_at` is not in the future
pub async fn provision_key(
    store: &dyn KeyStore,
    quotas: &PlanQuotas,
    user_id: Uuid,
    request: CreateApiKeyRequest,
    now: DateTime<Utc>,
) -> Result<IssuedApiKey, AppError> {
    if request.expires_at.is_some_and(|expires_at| expires_at <= now) {
        return Err(AppError::InvalidRequest(
            "expires_at must be in the future".to_string(),
        ));
    }

    let user = store
        .find_user(user_id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    ensure_not_blocked(&user)?;

    let name = request
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_KEY_NAME.to_string());

    let api_key = generate_api_key();
    let record = store
        .insert_key(NewApiKey {
            user_id,
            name,
            key_hash: hash_api_key(&api_key),
            key_prefix: display_prefix(&api_key),
            daily_quota: quotas.daily_quota(user.plan),
            expires_at: request.expires_at,
        })
        .await
        .map_err(|e| match e {
            StoreError::DuplicateOwner => AppError::Conflict(
                "User already has an API key. Regenerate it to get a new one.".to_string(),
            ),
            StoreError::UnknownUser => AppError::NotFound("User"),
            other => other.into(),
        })?;

    tracing::info!(%user_id, api_key_id = %record.id, "API key provisioned");
    Ok(issue(api_key, record))
}

pub async fn list_keys(store: &dyn KeyStore, user_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
    Ok(store.list_keys(user_id).await?)
}

pub async fn get_key(store: &dyn KeyStore, user_id: Uuid, key_id: Uuid) -> Result<ApiKey, AppError> {
    store
        .find_key(user_id, key_id)
        .await?
        .ok_or(AppError::NotFound("API key"))
}

pub async fn rename_key(
    store: &dyn KeyStore,
    user_id: Uuid,
    key_id: Uuid,
    name: &str,
) -> Result<ApiKey, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Name must not be empty".to_string()));
    }

    store
        .rename_key(user_id, key_id, name)
        .await?
        .ok_or(AppError::NotFound("API key"))
}

/// Replace the key's token and reactivate it.
///
/// Quota, owner and usage counters carry over, so regenerating does not hand
/// out fresh quota. The old token stops validating immediately. Keys of a
/// blocked user cannot be regenerated.
pub async fn regenerate_key(
    store: &dyn KeyStore,
    user_id: Uuid,
    key_id: Uuid,
) -> Result<IssuedApiKey, AppError> {
    let user = store
        .find_user(user_id)
        .await?
        .ok_or(AppError::NotFound("API key"))?;
    ensure_not_blocked(&user)?;

    let api_key = generate_api_key();
    let record = store
        .replace_key_hash(user_id, key_id, &hash_api_key(&api_key), &display_prefix(&api_key))
        .await?
        .ok_or(AppError::NotFound("API key"))?;

    tracing::info!(%user_id, api_key_id = %key_id, "API key regenerated");
    Ok(issue(api_key, record))
}

/// Soft delete: the row stays, requests with it are rejected.
pub async fn revoke_key(store: &dyn KeyStore, user_id: Uuid, key_id: Uuid) -> Result<ApiKey, AppError> {
    let record = store
        .revoke_key(user_id, key_id)
        .await?
        .ok_or(AppError::NotFound("API key"))?;

    tracing::info!(%user_id, api_key_id = %key_id, "API key revoked");
    Ok(record)
}

/// Hard delete, usage rows of the key go with it.
pub async fn delete_key(store: &dyn KeyStore, user_id: Uuid, key_id: Uuid) -> Result<(), AppError> {
    if !store.delete_key(user_id, key_id).await? {
        return Err(AppError::NotFound("API key"));
    }

    tracing::info!(%user_id, api_key_id = %key_id, "API key deleted");
    Ok(())
}

/// One page of the usage log.
pub async fn list_usage(store: &dyn KeyStore, query: &UsageQuery) -> Result<UsagePage, AppError> {
    let (limit, offset) = query.window();
    let (logs, total) = store.list_usage(&query.filter(), limit, offset).await?;

    Ok(UsagePage {
        logs,
        page: query.page.max(1),
        limit,
        total,
    })
}
