//! Admin HTTP handlers for users and their API keys.
//!
//! This module implements the operator endpoints:
//! - POST /api/v1/admin/users - Create a user
//! - GET /api/v1/admin/users - List users with filters and pagination
//! - GET /api/v1/admin/users/{user_id} - Get a user with their keys
//! - PUT /api/v1/admin/users/{user_id}/plan - Change a user's plan
//! - PUT /api/v1/admin/users/{user_id}/block - Block a user and revoke their keys
//! - PUT /api/v1/admin/users/{user_id}/unblock - Lift a block
//! - DELETE /api/v1/admin/users/{user_id} - Delete a user and everything they own
//! - POST /api/v1/admin/users/{user_id}/keys - Provision the user's key
//! - GET /api/v1/admin/users/{user_id}/keys - List the user's keys
//! - GET /api/v1/admin/users/{user_id}/keys/{key_id} - Get one key
//! - PUT /api/v1/admin/users/{user_id}/keys/{key_id} - Rename a key
//! - DELETE /api/v1/admin/users/{user_id}/keys/{key_id} - Delete a key
//! - PUT /api/v1/admin/users/{user_id}/keys/{key_id}/regenerate - Issue a new token
//! - POST /api/v1/admin/users/{user_id}/keys/{key_id}/revoke - Revoke a key
//! - GET /api/v1/admin/logs - Read the usage log
//!
//! All routes sit behind the admin token middleware. Provisioning and
//! regeneration are additionally rate limited per client address.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppError,
    models::{
        ApiResponse,
        api_key::{ApiKeyResponse, CreateApiKeyRequest, IssuedApiKey, RenameApiKeyRequest},
        plan::PlanQuotas,
        usage::{UsagePage, UsageQuery},
        user::{ChangePlanRequest, CreateUserRequest, User, UserDetail, UserPage, UserQuery},
    },
    middleware::rate_limit::{IpRateLimit, ip_rate_limit},
    services::key_service,
    store::KeyStore,
};

use super::extract::{AppJson, AppPath, AppQuery};

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn KeyStore>,
    pub quotas: PlanQuotas,
    pub clock: Arc<dyn Clock>,
}

/// Admin routes, still waiting for their state.
///
/// `key_generation` limits how often one address may provision or regenerate keys.
pub fn router(key_generation: IpRateLimit) -> Router<AdminState> {
    Router::new()
        .route("/api/v1/admin/users", post(create_user).get(list_users))
        .route(
            "/api/v1/admin/users/{user_id}",
            get(get_user).delete(delete_user),
        )
        .route("/api/v1/admin/users/{user_id}/plan", put(change_plan))
        .route("/api/v1/admin/users/{user_id}/block", put(block_user))
        .route("/api/v1/admin/users/{user_id}/unblock", put(unblock_user))
        .route(
            "/api/v1/admin/users/{user_id}/keys",
            post(provision_key)
                .layer(from_fn_with_state(key_generation.clone(), ip_rate_limit))
                .get(list_keys),
        )
        .route(
            "/api/v1/admin/users/{user_id}/keys/{key_id}",
            get(get_key).put(rename_key).delete(delete_key),
        )
        .route(
            "/api/v1/admin/users/{user_id}/keys/{key_id}/regenerate",
            put(regenerate_key).layer(from_fn_with_state(key_generation, ip_rate_limit)),
        )
        .route(
            "/api/v1/admin/users/{user_id}/keys/{key_id}/revoke",
            post(revoke_key),
        )
        .route("/api/v1/admin/logs", get(list_usage))
}

fn deleted(message: &str) -> Json<Value> {
    Json(json!({ "success": true, "message": message }))
}

/// Create a user.
///
/// # Request Body
///
/// ```json
/// { "username": "lofi-dev", "email": "dev@example.com", "plan": "pro" }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the created user
/// - **Error (400)**: blank username or email
/// - **Error (409)**: username or email taken
pub async fn create_user(
    State(state): State<AdminState>,
    AppJson(request): AppJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), AppError> {
    let user = key_service::create_user(state.store.as_ref(), request).await?;
    tracing::info!(user_id = %user.id, plan = user.plan.as_str(), "User created");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(user))))
}

/// List users.
///
/// # Endpoint
///
/// `GET /api/v1/admin/users?search=lofi&plan=pro&status=blocked&page=1&limit=10`
///
/// `search` matches username or email, case-insensitively. `limit` defaults
/// to 10 and is clamped to 1..=100.
pub async fn list_users(
    State(state): State<AdminState>,
    AppQuery(query): AppQuery<UserQuery>,
) -> Result<Json<ApiResponse<UserPage>>, AppError> {
    let page = key_service::list_users(state.store.as_ref(), &query).await?;

    Ok(Json(ApiResponse::ok(page)))
}

pub async fn get_user(
    State(state): State<AdminState>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<UserDetail>>, AppError> {
    let user = key_service::get_user(state.store.as_ref(), user_id).await?;

    Ok(Json(ApiResponse::ok(user)))
}

/// Block a user. Every active key of theirs is revoked; unblocking does not
/// bring them back.
pub async fn block_user(
    State(state): State<AdminState>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let user = key_service::block_user(state.store.as_ref(), user_id).await?;

    Ok(Json(ApiResponse::ok(user)))
}

pub async fn unblock_user(
    State(state): State<AdminState>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let user = key_service::unblock_user(state.store.as_ref(), user_id).await?;

    Ok(Json(ApiResponse::ok(user)))
}

/// Change a user's plan. Active keys pick up the new plan's quota.
pub async fn change_plan(
    State(state): State<AdminState>,
    AppPath(user_id): AppPath<Uuid>,
    AppJson(request): AppJson<ChangePlanRequest>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let user =
        key_service::change_plan(state.store.as_ref(), &state.quotas, user_id, request.plan).await?;

    Ok(Json(ApiResponse::ok(user)))
}

pub async fn delete_user(
    State(state): State<AdminState>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    key_service::delete_user(state.store.as_ref(), user_id).await?;
    tracing::info!(%user_id, "User deleted");

    Ok(deleted("User deleted"))
}

/// Provision the user's API key.
///
/// # Request Body
///
/// Optional; `{}` or no body at all gives a key named "My API Key" that never expires.
///
/// # Response
///
/// - **Success (201 Created)**: the key record plus the plaintext `api_key`,
///   shown this one time only
/// - **Error (404)**: unknown user
/// - **Error (409)**: the user already has a key, or is blocked
/// - **Error (429)**: too many key requests from this address
pub async fn provision_key(
    State(state): State<AdminState>,
    AppPath(user_id): AppPath<Uuid>,
    request: Option<AppJson<CreateApiKeyRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<IssuedApiKey>>), AppError> {
    let request = request.map(|AppJson(r)| r).unwrap_or_default();
    let issued = key_service::provision_key(
        state.store.as_ref(),
        &state.quotas,
        user_id,
        request,
        state.clock.now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(issued))))
}

pub async fn list_keys(
    State(state): State<AdminState>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<Vec<ApiKeyResponse>>>, AppError> {
    let keys = key_service::list_keys(state.store.as_ref(), user_id).await?;

    Ok(Json(ApiResponse::ok(
        keys.into_iter().map(ApiKeyResponse::from).collect(),
    )))
}

pub async fn get_key(
    State(state): State<AdminState>,
    AppPath((user_id, key_id)): AppPath<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<ApiKeyResponse>>, AppError> {
    let key = key_service::get_key(state.store.as_ref(), user_id, key_id).await?;

    Ok(Json(ApiResponse::ok(key.into())))
}

pub async fn rename_key(
    State(state): State<AdminState>,
    AppPath((user_id, key_id)): AppPath<(Uuid, Uuid)>,
    AppJson(request): AppJson<RenameApiKeyRequest>,
) -> Result<Json<ApiResponse<ApiKeyResponse>>, AppError> {
    let key = key_service::rename_key(state.store.as_ref(), user_id, key_id, &request.name).await?;

    Ok(Json(ApiResponse::ok(key.into())))
}

/// Replace the key's token. The old token stops working immediately.
pub async fn regenerate_key(
    State(state): State<AdminState>,
    AppPath((user_id, key_id)): AppPath<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<IssuedApiKey>>, AppError> {
    let issued = key_service::regenerate_key(state.store.as_ref(), user_id, key_id).await?;

    Ok(Json(ApiResponse::ok(issued)))
}

pub async fn revoke_key(
    State(state): State<AdminState>,
    AppPath((user_id, key_id)): AppPath<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<ApiKeyResponse>>, AppError> {
    let key = key_service::revoke_key(state.store.as_ref(), user_id, key_id).await?;

    Ok(Json(ApiResponse::ok(key.into())))
}

pub async fn delete_key(
    State(state): State<AdminState>,
    AppPath((user_id, key_id)): AppPath<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    key_service::delete_key(state.store.as_ref(), user_id, key_id).await?;

    Ok(deleted("API key deleted"))
}

/// Read the usage log, newest first.
///
/// # Endpoint
///
/// `GET /api/v1/admin/logs?user_id=...&endpoint=/songs&status_code=200&page=1&limit=50`
///
/// All filters are optional. `endpoint` is a substring match. `limit`
/// defaults to 50 and is clamped to 1..=100.
pub async fn list_usage(
    State(state): State<AdminState>,
    AppQuery(query): AppQuery<UsageQuery>,
) -> Result<Json<ApiResponse<UsagePage>>, AppError> {
    let page = key_service::list_usage(state.store.as_ref(), &query).await?;

    Ok(Json(ApiResponse::ok(page)))
}
