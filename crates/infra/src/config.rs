//! Configuration loading.
//!
//! Parsing is a pure function over a key lookup so tests never touch the
//! process environment; [`AppConfig::from_env`] is the thin wrapper used by
//! the binary.

use std::net::SocketAddr;

use jobboard_core::Money;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be set")]
    Missing { key: &'static str },

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub api_base: String,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslcommerzConfig {
    pub store_id: Option<String>,
    pub store_password: Option<String>,
    pub sandbox: bool,
    pub price: Money,
}

impl SslcommerzConfig {
    pub fn gateway_base(&self) -> &'static str {
        if self.sandbox {
            "https://sandbox.sslcommerz.com"
        } else {
            "https://securepay.sslcommerz.com"
        }
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.store_id.as_deref()?, self.store_password.as_deref()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    /// SMTP connect and command timeout, in seconds.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Frontend origin; browser redirects land here.
    pub app_base_url: String,
    /// Public origin of this service; provider callback URLs are built from it.
    pub api_base_url: String,
    pub jwt_secret: String,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub stripe: StripeConfig,
    pub sslcommerz: SslcommerzConfig,
    pub smtp: Option<SmtpConfig>,
    pub relay: Option<RelayConfig>,
    pub pending_payment_ttl_minutes: i64,
    pub webhook_tolerance_secs: u64,
}

pub const DEV_JWT_SECRET: &str = "dev-secret";

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = parse_or(&get, "BIND_ADDR", "0.0.0.0:8080".parse().ok())?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let persistent = parse_or(&get, "USE_PERSISTENT_STORES", Some(false))?;
        let database_url = if persistent {
            Some(get("DATABASE_URL").ok_or(ConfigError::Missing { key: "DATABASE_URL" })?)
        } else {
            None
        };

        let stripe_currency = get("STRIPE_CURRENCY").unwrap_or_else(|| "usd".to_string());
        let stripe_price = price(parse_or(&get, "STRIPE_PRICE_MINOR", Some(1000))?, &stripe_currency, "STRIPE_CURRENCY")?;

        let ssl_currency = get("SSLCOMMERZ_CURRENCY").unwrap_or_else(|| "BDT".to_string());
        let ssl_price = price(parse_or(&get, "SSLCOMMERZ_PRICE_MINOR", Some(50_000))?, &ssl_currency, "SSLCOMMERZ_CURRENCY")?;

        let smtp_timeout_secs: u64 = parse_or(&get, "SMTP_TIMEOUT_SECS", Some(5))?;
        if smtp_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "SMTP_TIMEOUT_SECS",
                reason: "must be at least 1".to_string(),
            });
        }
        let smtp = get("SMTP_HOST").map(|host| SmtpConfig {
            host,
            username: get("SMTP_USERNAME"),
            password: get("SMTP_PASSWORD"),
            from: get("MAIL_FROM").unwrap_or_else(|| "Job Board <no-reply@localhost>".to_string()),
            timeout_secs: smtp_timeout_secs,
        });

        let relay = get("REALTIME_RELAY_URL").map(|url| RelayConfig {
            url: url.trim_end_matches('/').to_string(),
            token: get("REALTIME_RELAY_TOKEN"),
        });

        let ttl: i64 = parse_or(&get, "PENDING_PAYMENT_TTL_MINUTES", Some(60))?;
        if ttl <= 0 {
            return Err(ConfigError::Invalid {
                key: "PENDING_PAYMENT_TTL_MINUTES",
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            app_base_url: base_url(get("APP_BASE_URL"), "http://localhost:3000"),
            api_base_url: base_url(get("API_BASE_URL"), "http://localhost:8080"),
            jwt_secret,
            database_url,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", Some(5))?,
            stripe: StripeConfig {
                secret_key: get("STRIPE_SECRET_KEY"),
                webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
                api_base: base_url(get("STRIPE_API_BASE"), "https://api.stripe.com"),
                price: stripe_price,
            },
            sslcommerz: SslcommerzConfig {
                store_id: get("SSLCOMMERZ_STORE_ID"),
                store_password: get("SSLCOMMERZ_STORE_PASSWORD"),
                sandbox: parse_or(&get, "SSLCOMMERZ_SANDBOX", Some(true))?,
                price: ssl_price,
            },
            smtp,
            relay,
            pending_payment_ttl_minutes: ttl,
            webhook_tolerance_secs: parse_or(&get, "WEBHOOK_TOLERANCE_SECS", Some(300))?,
        })
    }

    pub fn pending_payment_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.pending_payment_ttl_minutes)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => default.ok_or(ConfigError::Missing { key }),
    }
}

fn price(amount_minor: i64, currency: &str, key: &'static str) -> Result<Money, ConfigError> {
    Money::new(amount_minor, currency).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

fn base_url(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}
