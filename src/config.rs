//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use std::{num::NonZeroU32, time::Duration};

use serde::Deserialize;

use crate::models::plan::PlanQuotas;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `ADMIN_TOKEN` (required): bearer token for the admin routes
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `FREE_DAILY_QUOTA`, `PRO_DAILY_QUOTA`, `ENTERPRISE_DAILY_QUOTA` (optional):
///   daily request quota per plan, default 100 / 10000 / 999999
/// - `USAGE_BUFFER` (optional): queued usage records before new ones are dropped, defaults to 1024
/// - `CORS_ORIGINS` (optional): comma separated allowed origins, defaults to `http://localhost:3000`
/// - `RATE_LIMIT_MAX`, `RATE_LIMIT_WINDOW_SECS` (optional): requests per client
///   address across every route, default 100 per 900 seconds
/// - `KEY_GENERATION_LIMIT_MAX`, `KEY_GENERATION_LIMIT_WINDOW_SECS` (optional):
///   key provisioning and regeneration requests per client address, default 3 per 3600 seconds
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub admin_token: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_free_quota")]
    pub free_daily_quota: i32,

    #[serde(default = "default_pro_quota")]
    pub pro_daily_quota: i32,

    #[serde(default = "default_enterprise_quota")]
    pub enterprise_daily_quota: i32,

    #[serde(default = "default_usage_buffer")]
    pub usage_buffer: usize,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,

    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: NonZeroU32,

    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u64,

    #[serde(default = "default_key_generation_limit_max")]
    pub key_generation_limit_max: NonZeroU32,

    #[serde(default = "default_key_generation_limit_window")]
    pub key_generation_limit_window_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_free_quota() -> i32 {
    PlanQuotas::default().free
}

fn default_pro_quota() -> i32 {
    PlanQuotas::default().pro
}

fn default_enterprise_quota() -> i32 {
    PlanQuotas::default().enterprise
}

fn default_usage_buffer() -> usize {
    1024
}

fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

fn default_rate_limit_max() -> NonZeroU32 {
    NonZeroU32::new(100).unwrap_or(NonZeroU32::MIN)
}

fn default_rate_limit_window() -> u64 {
    15 * 60
}

fn default_key_generation_limit_max() -> NonZeroU32 {
    NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN)
}

fn default_key_generation_limit_window() -> u64 {
    60 * 60
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (DATABASE_URL, ADMIN_TOKEN)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Plan-to-quota table handed to the key management service.
    pub fn plan_quotas(&self) -> PlanQuotas {
        PlanQuotas {
            free: self.free_daily_quota,
            pro: self.pro_daily_quota,
            enterprise: self.enterprise_daily_quota,
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn key_generation_limit_window(&self) -> Duration {
        Duration::from_secs(self.key_generation_limit_window_secs)
    }

    /// Allowed CORS origins, blank entries skipped.
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        envy::from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/music"),
            ("ADMIN_TOKEN", "operator"),
        ]);

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.usage_buffer, 1024);
        assert_eq!(config.plan_quotas(), PlanQuotas::default());
        assert_eq!(config.cors_origin_list(), vec!["http://localhost:3000"]);
    }

    #[test]
    fn plan_quotas_are_overridable() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/music"),
            ("ADMIN_TOKEN", "operator"),
            ("PRO_DAILY_QUOTA", "2500"),
            ("CORS_ORIGINS", "https://app.example.com, ,https://docs.example.com"),
        ]);

        assert_eq!(config.plan_quotas().pro, 2500);
        assert_eq!(config.plan_quotas().free, 100);
        assert_eq!(
            config.cors_origin_list(),
            vec!["https://app.example.com", "https://docs.example.com"]
        );
    }

    #[test]
    fn rate_limits_default_and_reject_zero() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/music"),
            ("ADMIN_TOKEN", "operator"),
            ("KEY_GENERATION_LIMIT_MAX", "5"),
        ]);

        assert_eq!(config.rate_limit_max.get(), 100);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(900));
        assert_eq!(config.key_generation_limit_max.get(), 5);
        assert_eq!(config.key_generation_limit_window(), Duration::from_secs(3600));

        let zero = envy::from_iter::<_, Config>(vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/music".to_string()),
            ("ADMIN_TOKEN".to_string(), "operator".to_string()),
            ("RATE_LIMIT_MAX".to_string(), "0".to_string()),
        ]);
        assert!(zero.is_err());
    }

    #[test]
    fn missing_admin_token_is_an_error() {
        let result = envy::from_iter::<_, Config>(vec![(
            "DATABASE_URL".to_string(),
            "postgres://localhost/music".to_string(),
        )]);
        assert!(result.is_err());
    }
}
