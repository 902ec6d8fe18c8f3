use std::env;

use anyhow::Context as _;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub gateway: GatewayConfig,
    pub store_currency: String,
    /// Pending and payment-initiated orders untouched for this long are
    /// swept to `expired`.
    pub order_retention_hours: i64,
    pub expiry_sweep_interval_secs: u64,
}

/// Credentials for the hosted payment gateway. `key_id` is publishable and
/// goes into the storefront widget; `key_secret` signs and verifies payment
/// callbacks and must never reach a client.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let gateway = GatewayConfig {
            base_url: env::var("PAYMENT_GATEWAY_URL").context("PAYMENT_GATEWAY_URL must be set")?,
            key_id: env::var("PAYMENT_GATEWAY_KEY_ID")
                .context("PAYMENT_GATEWAY_KEY_ID must be set")?,
            key_secret: env::var("PAYMENT_GATEWAY_KEY_SECRET")
                .context("PAYMENT_GATEWAY_KEY_SECRET must be set")?,
            timeout_secs: env::var("PAYMENT_GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10),
        };
        let store_currency = env::var("STORE_CURRENCY").unwrap_or_else(|_| "USD".to_string());
        let order_retention_hours = env::var("ORDER_RETENTION_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(24);
        let expiry_sweep_interval_secs = env::var("EXPIRY_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            gateway,
            store_currency,
            order_retention_hours,
            expiry_sweep_interval_secs,
        })
    }
}
