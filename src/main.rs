//! Music API Gateway - Main Application Entry Point
//!
//! This is a REST API server exposing a song catalogue to third-party
//! developers. Every catalogue request must carry an API key in the
//! `x-api-key` header; keys are metered against a daily quota that depends on
//! the owner's plan and is reset at local midnight.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Metering**: API key gate with SHA-256 hashed keys and atomic quota counters
//! - **Rate limiting**: per-IP GCRA limits (governor), stricter on key generation
//! - **Usage log**: background writer fed through a bounded channel
//! - **Reset**: owned scheduler task zeroing daily counters at midnight
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Start the usage recorder and the daily reset scheduler
//! 4. Build HTTP router with routes and middleware
//! 5. Serve until Ctrl+C, then stop the scheduler and flush usage records

mod clock;
mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod store;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::get,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::{
    clock::{Clock, SystemClock},
    handlers::admin::AdminState,
    middleware::{
        admin_auth::{AdminToken, admin_auth},
        quota_gate::{API_KEY_HEADER, QuotaGate, quota_gate},
        rate_limit::{IpRateLimit, ip_rate_limit},
    },
    services::{reset_scheduler::DailyResetScheduler, usage_recorder::UsageRecorder},
    store::{KeyStore, postgres::PgKeyStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store: Arc<dyn KeyStore> = Arc::new(PgKeyStore::new(pool.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (recorder, usage_writer) = UsageRecorder::spawn(store.clone(), config.usage_buffer);
    let mut scheduler = DailyResetScheduler::new(store.clone(), clock.clone());
    scheduler.start();

    // Metered catalogue routes
    let song_routes = Router::new()
        .route("/api/v1/songs", get(handlers::songs::list_songs))
        .route("/api/v1/songs/moods", get(handlers::songs::list_moods))
        .route("/api/v1/songs/random", get(handlers::songs::random_songs))
        .route("/api/v1/songs/mood/{mood}", get(handlers::songs::songs_by_mood))
        .route("/api/v1/songs/{id}", get(handlers::songs::get_song))
        .route_layer(axum_middleware::from_fn_with_state(
            QuotaGate::new(store.clone(), recorder, clock.clone()),
            quota_gate,
        ))
        .with_state(pool.clone());

    let general_limit = IpRateLimit::new(
        config.rate_limit_max,
        config.rate_limit_window(),
        "Too many requests from this IP, please try again later.",
    );
    let key_generation_limit = IpRateLimit::new(
        config.key_generation_limit_max,
        config.key_generation_limit_window(),
        "Too many API key generation requests, please try again later.",
    );

    // Operator routes
    let admin_routes = handlers::admin::router(key_generation_limit)
        .route_layer(axum_middleware::from_fn_with_state(
            AdminToken::new(config.admin_token.as_str()),
            admin_auth,
        ))
        .with_state(AdminState {
            store,
            quotas: config.plan_quotas(),
            clock,
        });

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .with_state(pool)
        .merge(song_routes)
        .merge(admin_routes)
        .layer(axum_middleware::from_fn_with_state(general_limit, ip_rate_limit))
        .layer(cors_layer(&config.cors_origin_list())?)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Client addresses are needed for the usage log and the rate limits
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped, shutting down background tasks");
    scheduler.stop().await;

    // The router and its gate are gone, so the writer drains the queue and exits
    if let Err(e) = usage_writer.await {
        tracing::error!(error = %e, "Usage recorder ended abnormally");
    }

    Ok(())
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            HeaderName::from_static(API_KEY_HEADER),
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
        ]))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
