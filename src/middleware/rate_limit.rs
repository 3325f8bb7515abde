//! Per-IP request rate limiting.
//!
//! Each [`IpRateLimit`] is a GCRA limiter keyed by client address: `max`
//! requests may arrive back to back, after which one more is allowed every
//! `window / max`. Requests without a known peer address (no `ConnectInfo`)
//! are not limited.

use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::error::AppError;

/// Tracked addresses above which idle entries are dropped.
const RETAIN_THRESHOLD: usize = 10_000;

#[derive(Clone)]
pub struct IpRateLimit {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    message: &'static str,
}

impl IpRateLimit {
    /// Allow `max` requests per `window` from each address.
    pub fn new(max: NonZeroU32, window: Duration, message: &'static str) -> Self {
        let period = (window / max.get()).max(Duration::from_millis(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(max))
            .allow_burst(max);

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            message,
        }
    }

    fn check(&self, ip: IpAddr) -> Result<(), AppError> {
        if self.limiter.len() > RETAIN_THRESHOLD {
            self.limiter.retain_recent();
        }

        self.limiter
            .check_key(&ip)
            .map_err(|_| AppError::RateLimited(self.message))
    }
}

/// Reject the request with 429 once its address has used up the limit.
pub async fn ip_rate_limit(
    State(limit): State<IpRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if let Some(ip) = ip {
        if let Err(err) = limit.check(ip) {
            tracing::warn!(%ip, path = %request.uri().path(), "Rate limit hit");
            return Err(err);
        }
    }

    Ok(next.run(request).await)
}
