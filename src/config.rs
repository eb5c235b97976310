//! Runtime configuration from the environment (`.env` is loaded by `main`).

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Runs on the in-memory store when unset.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub jwt_secret: String,
    pub min_withdrawal: Decimal,
    pub shipping_price: Decimal,
    pub default_commission: Decimal,
    pub payments: PaymentConfig,
}

#[derive(Clone, Debug, Default)]
pub struct PaymentConfig {
    pub click_service_id: String,
    pub click_merchant_id: String,
    pub payme_merchant_id: String,
    pub return_url: String,
    /// Shared with the providers; callbacks must echo it in `X-Callback-Secret`.
    /// Callbacks are refused while it is unset.
    pub callback_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: parse_or("PORT", 8083)?,
            database_url: std::env::var("DATABASE_URL").ok(),
            nats_url: std::env::var("NATS_URL").ok(),
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            min_withdrawal: parse_or("MIN_WITHDRAWAL_AMOUNT", Decimal::from(100_000))?,
            shipping_price: parse_or("SHIPPING_PRICE", Decimal::ZERO)?,
            default_commission: parse_or("SELLER_COMMISSION_PERCENT", Decimal::from(10))?,
            payments: PaymentConfig {
                click_service_id: std::env::var("CLICK_SERVICE_ID").unwrap_or_default(),
                click_merchant_id: std::env::var("CLICK_MERCHANT_ID").unwrap_or_default(),
                payme_merchant_id: std::env::var("PAYME_MERCHANT_ID").unwrap_or_default(),
                return_url: std::env::var("PAYMENT_RETURN_URL").unwrap_or_else(|_| "http://localhost:3000/orders".to_string()),
                callback_secret: std::env::var("PAYMENT_CALLBACK_SECRET").ok().filter(|s| !s.is_empty()),
            },
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
