use std::env;

use crate::payments::{PayPalConfig, TapConfig};
use crate::rate_limit::RateLimitConfig;

const DEFAULT_PAYPAL_API_BASE: &str = "https://api-m.sandbox.paypal.com";
const DEFAULT_TAP_API_BASE: &str = "https://api.tap.company";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Public URL of this service (used for provider webhooks)
    pub base_url: String,
    /// Storefront URL hosting /payment-success and /payment-failed
    pub site_url: String,
    pub dev_mode: bool,
    pub paypal: Option<PayPalConfig>,
    pub tap: Option<TapConfig>,
    pub rate_limit: RateLimitConfig,
    pub user_cache_ttl_secs: u64,
    pub user_cache_capacity: u64,
    /// Days to keep webhook dedup records (0 = never purge)
    pub webhook_event_retention_days: i64,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("JOJO_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port));
        let site_url = env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "jojoprompts.db".to_string()),
            base_url,
            site_url,
            dev_mode,
            paypal: paypal_from_env(),
            tap: tap_from_env(),
            rate_limit: RateLimitConfig::from_env(),
            user_cache_ttl_secs: parse_env("USER_CACHE_TTL_SECS", 60),
            user_cache_capacity: parse_env("USER_CACHE_CAPACITY", 256),
            webhook_event_retention_days: parse_env("WEBHOOK_EVENT_RETENTION_DAYS", 7),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// PayPal credentials are optional at startup; endpoints report a configuration
/// error when they are missing.
fn paypal_from_env() -> Option<PayPalConfig> {
    let client_id = env::var("PAYPAL_CLIENT_ID").ok().filter(|v| !v.is_empty())?;
    let client_secret = env::var("PAYPAL_CLIENT_SECRET").ok().filter(|v| !v.is_empty())?;
    Some(PayPalConfig {
        client_id,
        client_secret,
        api_base: env::var("PAYPAL_API_BASE")
            .unwrap_or_else(|_| DEFAULT_PAYPAL_API_BASE.to_string()),
        currency: env::var("PAYPAL_CURRENCY").unwrap_or_else(|_| "USD".to_string()),
    })
}

fn tap_from_env() -> Option<TapConfig> {
    let secret_key = env::var("TAP_SECRET_KEY").ok().filter(|v| !v.is_empty())?;
    Some(TapConfig {
        secret_key,
        api_base: env::var("TAP_API_BASE").unwrap_or_else(|_| DEFAULT_TAP_API_BASE.to_string()),
        currency: env::var("TAP_CURRENCY").unwrap_or_else(|_| "USD".to_string()),
    })
}
