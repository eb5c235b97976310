//! OptBozor Marketplace
//!
//! Order, payment and seller-ledger core of a wholesale marketplace.
//!
//! ## Features
//! - Product catalog with wholesale pricing and stock counters
//! - Promo codes (percentage / fixed) with validity windows and usage caps
//! - Order lifecycle with an explicit status state machine
//! - Click / Payme redirect payments with idempotent callbacks
//! - Seller balances, settlement and withdrawal requests

pub mod auth;
pub mod config;
pub mod domain;
pub mod http;
pub mod notify;
pub mod services;
pub mod store;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Promo code not found: {0}")]
    PromoNotFound(String),

    #[error("Withdrawal not found: {0}")]
    WithdrawalNotFound(Uuid),

    #[error("Seller not found: {0}")]
    SellerNotFound(Uuid),

    #[error("Category not found: {0}")]
    CategoryNotFound(Uuid),

    #[error("Out of stock for {product}: requested {requested}, available {available}")]
    OutOfStock { product: String, requested: u32, available: u32 },

    #[error("Promo code is not valid: {0}")]
    PromoInvalid(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Decimal, available: Decimal },

    #[error("Bank account details are missing")]
    MissingBankInfo,

    #[error("Amount is below the minimum withdrawal of {0}")]
    BelowMinimum(Decimal),

    #[error("Withdrawal has already been processed")]
    AlreadyProcessed,

    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for MarketError {
    fn from(e: sqlx::Error) -> Self {
        MarketError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
