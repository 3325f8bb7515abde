//! API key metering middleware.
//!
//! This middleware guards every metered route. For each request it:
//! 1. Extracts the API key from the `x-api-key` header
//! 2. Hashes it and looks up an active key with that hash
//! 3. Rejects expired keys and keys whose daily quota is used up
//! 4. Atomically increments the key's counters and admits the request
//! 5. Injects [`ApiKeyIdentity`] into the request for downstream handlers
//! 6. Once the response status is known, queues a usage record
//!
//! # Rejections
//!
//! - No key → 401
//! - Unknown or revoked key → 403 (indistinguishable on purpose)
//! - Expired key → 403
//! - Quota used up → 429 with `{ limit, used, remaining }`
//! - Key store failure → 500
//!
//! Rejected requests never reach the handler and are not recorded as usage,
//! except a store failure after the key was resolved, which is recorded with
//! status 500.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    extract::{ConnectInfo, OriginalUri, Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppError,
    models::{
        api_key::{ApiKey, QuotaReport},
        usage::NewApiUsage,
    },
    services::{key_service::hash_api_key, usage_recorder::UsageRecorder},
    store::{ConsumeOutcome, KeyStore},
};

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Identity of the admitted caller, attached to the request extensions.
///
/// Handlers extract it with `Extension<ApiKeyIdentity>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiKeyIdentity {
    /// Owner of the key
    pub user_id: Uuid,

    /// Key that was charged for this request
    pub api_key_id: Uuid,
}

/// Shared state of the gate.
#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn KeyStore>,
    recorder: UsageRecorder,
    clock: Arc<dyn Clock>,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn KeyStore>, recorder: UsageRecorder, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            recorder,
            clock,
        }
    }

    /// Run the admission checks in order and charge the key on success.
    async fn admit(&self, presented: Option<&str>) -> Result<ApiKey, Rejection> {
        let presented = presented
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(Rejection::Early(AppError::MissingApiKey))?;

        let key = self
            .store
            .find_active_by_hash(&hash_api_key(presented))
            .await
            .map_err(|e| Rejection::Early(e.into()))?
            .ok_or(Rejection::Early(AppError::InvalidApiKey))?;

        let now = self.clock.now();
        if key.is_expired_at(now) {
            return Err(Rejection::Early(AppError::ExpiredApiKey));
        }

        if key.is_exhausted() {
            return Err(Rejection::Early(AppError::QuotaExceeded(QuotaReport::new(
                key.daily_quota,
                key.used_today,
            ))));
        }

        match self.store.try_consume(key.id, now).await {
            Ok(ConsumeOutcome::Admitted(key)) => Ok(key),
            // Another request took the last unit between the read and the update
            Ok(ConsumeOutcome::Exhausted(current)) => Err(Rejection::Early(AppError::QuotaExceeded(
                QuotaReport::new(current.daily_quota, current.used_today),
            ))),
            Ok(ConsumeOutcome::Inactive) => Err(Rejection::Early(AppError::InvalidApiKey)),
            Err(e) => Err(Rejection::Resolved(key, e.into())),
        }
    }
}

/// Why admission failed, and whether the key was already known at that point.
enum Rejection {
    Early(AppError),
    Resolved(ApiKey, AppError),
}

/// Request details captured before the request is handed on.
struct CallerInfo {
    endpoint: String,
    method: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl CallerInfo {
    fn capture(request: &Request) -> Self {
        let endpoint = request
            .extensions()
            .get::<OriginalUri>()
            .map(|uri| &uri.0)
            .unwrap_or(request.uri());
        let endpoint = endpoint
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| endpoint.path().to_string());

        Self {
            endpoint,
            method: request.method().to_string(),
            ip_address: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string()),
            user_agent: header_value(request.headers(), header::USER_AGENT.as_str()),
        }
    }

    fn into_usage(self, key: &ApiKey, status_code: u16, started: Instant) -> NewApiUsage {
        NewApiUsage {
            api_key_id: key.id,
            user_id: key.user_id,
            endpoint: self.endpoint,
            method: self.method,
            status_code: i32::from(status_code),
            response_time_ms: i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX),
            ip_address: self.ip_address,
            user_agent: self.user_agent,
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Quota gate middleware function.
///
/// Mounted with `axum::middleware::from_fn_with_state(gate, quota_gate)`.
pub async fn quota_gate(
    State(gate): State<QuotaGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let started = Instant::now();
    let caller = CallerInfo::capture(&request);

    // A header that is not valid visible ASCII cannot match any issued key
    let presented = match request.headers().get(API_KEY_HEADER) {
        None => None,
        Some(value) => Some(value.to_str().map_err(|_| AppError::InvalidApiKey)?),
    };

    let key = match gate.admit(presented).await {
        Ok(key) => key,
        Err(Rejection::Early(err)) => return Err(err),
        Err(Rejection::Resolved(key, err)) => {
            gate.recorder
                .record(caller.into_usage(&key, err.status_code().as_u16(), started));
            return Err(err);
        }
    };

    tracing::debug!(
        api_key_id = %key.id,
        used_today = key.used_today,
        daily_quota = key.daily_quota,
        "API key admitted"
    );

    request.extensions_mut().insert(ApiKeyIdentity {
        user_id: key.user_id,
        api_key_id: key.id,
    });

    let response = next.run(request).await;

    gate.recorder
        .record(caller.into_usage(&key, response.status().as_u16(), started));

    Ok(response)
}
