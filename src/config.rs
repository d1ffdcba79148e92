// Service configuration loaded from the environment

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::carts::{CartSettings, SweeperSettings};
use crate::db::PoolSettings;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which `CartStore` implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("expected 'postgres' or 'memory', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CartConfig {
    pub backend: StoreBackend,
    /// Required only for the postgres backend
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub product_service_url: String,
    pub product_service_timeout: Duration,
    pub cart_ttl: Duration,
    pub tax_rate: Decimal,
    pub shipping_cost: Decimal,
    pub abandon_after: Duration,
    pub sweep_interval: Duration,
    pub sweep_timeout: Duration,
    pub max_write_attempts: u32,
    pub log_level: String,
}

impl CartConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let backend = parse_or(&get, "CART_STORE_BACKEND", StoreBackend::Postgres, |v| {
            v.parse::<StoreBackend>()
        })?;

        let database_url = get("DATABASE_URL").or_else(|| get("CART_DB_URL"));
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_secret = get("CART_JWT_SECRET").ok_or(ConfigError::Missing("CART_JWT_SECRET"))?;

        let max_write_attempts = parse_or(&get, "CART_MAX_WRITE_ATTEMPTS", 3, |v| {
            match v.parse::<u32>() {
                Ok(0) => Err("must be at least 1".to_string()),
                Ok(n) => Ok(n),
                Err(e) => Err(e.to_string()),
            }
        })?;

        Ok(Self {
            backend,
            database_url,
            db_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10, |v| {
                match v.parse::<u32>() {
                    Ok(0) => Err("must be at least 1".to_string()),
                    Ok(n) => Ok(n),
                    Err(e) => Err(e.to_string()),
                }
            })?,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "CART_PORT", 8083, |v| v.parse::<u16>().map_err(|e| e.to_string()))?,
            jwt_secret,
            product_service_url: get("PRODUCT_SERVICE_URL")
                .unwrap_or_else(|| "http://product-service:8082".to_string()),
            product_service_timeout: parse_or(&get, "PRODUCT_SERVICE_TIMEOUT", Duration::from_secs(10), parse_duration)?,
            cart_ttl: parse_or(&get, "CART_TTL", Duration::from_secs(72 * 3600), parse_duration)?,
            tax_rate: parse_or(&get, "CART_TAX_RATE", Decimal::new(18, 2), parse_money)?,
            shipping_cost: parse_or(&get, "CART_SHIPPING_COST", Decimal::ZERO, parse_money)?,
            abandon_after: parse_or(&get, "CART_ABANDON_AFTER", Duration::from_secs(24 * 3600), parse_duration)?,
            sweep_interval: parse_or(&get, "CART_SWEEP_INTERVAL", Duration::from_secs(3600), parse_duration)?,
            sweep_timeout: parse_or(&get, "CART_SWEEP_TIMEOUT", Duration::from_secs(30), parse_duration)?,
            max_write_attempts,
            log_level: get("CART_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn cart_settings(&self) -> Result<CartSettings, ConfigError> {
        Ok(CartSettings {
            cart_ttl: to_chrono("CART_TTL", self.cart_ttl)?,
            tax_rate: self.tax_rate,
            shipping_cost: self.shipping_cost,
            max_write_attempts: self.max_write_attempts,
        })
    }

    pub fn sweeper_settings(&self) -> Result<SweeperSettings, ConfigError> {
        Ok(SweeperSettings {
            interval: self.sweep_interval,
            abandon_after: to_chrono("CART_ABANDON_AFTER", self.abandon_after)?,
            run_timeout: self.sweep_timeout,
        })
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.db_max_connections,
            ..PoolSettings::default()
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G, P>(get: &G, key: &'static str, default: T, parse: P) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => parse(value.trim()).map_err(|reason| ConfigError::Invalid {
            key,
            value,
            reason,
        }),
    }
}

/// Parse `<int><unit>` where unit is one of `s`, `m`, `h`, `d`
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| "missing unit (s, m, h or d)".to_string())?;
    let (amount, unit) = value.split_at(split);

    let amount: u64 = amount
        .parse()
        .map_err(|_| "expected a whole number before the unit".to_string())?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => return Err(format!("unknown unit '{}'", other)),
    };

    amount
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| "duration is too large".to_string())
}

fn parse_money(value: &str) -> Result<Decimal, String> {
    let amount = Decimal::from_str(value).map_err(|e| e.to_string())?;
    if amount.is_sign_negative() {
        return Err("must not be negative".to_string());
    }
    Ok(amount)
}

fn to_chrono(key: &'static str, duration: Duration) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::from_std(duration).map_err(|e| ConfigError::Invalid {
        key,
        value: format!("{:?}", duration),
        reason: e.to_string(),
    })
}
