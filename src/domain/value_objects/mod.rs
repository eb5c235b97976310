//! Value Objects for the marketplace

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Money value object. Amounts are in the marketplace currency (UZS) with two
/// decimal places of precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const CURRENCY: &'static str = "UZS";

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn from_major(amount: i64) -> Self { Self(Decimal::from(amount)) }
    pub fn zero() -> Self { Self(Decimal::ZERO) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }

    pub fn add(&self, other: Money) -> Money { Money(self.0 + other.0) }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }

    /// Subtraction floored at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        if other.0 >= self.0 { Money::zero() } else { Money(self.0 - other.0) }
    }

    /// `percent` of this amount, rounded half away from zero to two places.
    pub fn percentage(&self, percent: Decimal) -> Money {
        let raw = self.0 * percent / Decimal::ONE_HUNDRED;
        Money(raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Amount in minor units (tiyin), as payment providers expect.
    pub fn minor_units(&self) -> Decimal {
        (self.0 * Decimal::ONE_HUNDRED).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self { Money(value) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.0.normalize(), Self::CURRENCY) }
}

/// Phone number in the national format `+998XXXXXXXXX`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone(String);

impl Phone {
    pub const COUNTRY_PREFIX: &'static str = "+998";

    /// Accepts spaces, dashes and parentheses as separators and normalizes them away.
    pub fn parse(value: &str) -> Result<Self, PhoneError> {
        let compact: String = value.chars().filter(|c| !matches!(c, ' ' | '-' | '(' | ')')).collect();
        let digits = compact.strip_prefix(Self::COUNTRY_PREFIX).ok_or(PhoneError::WrongCountry)?;
        if digits.len() != 9 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PhoneError::Malformed);
        }
        Ok(Self(compact))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Phone {
    type Error = PhoneError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Phone::parse(&value) }
}

impl From<Phone> for String {
    fn from(value: Phone) -> Self { value.0 }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PhoneError { WrongCountry, Malformed }
impl std::error::Error for PhoneError {}
impl fmt::Display for PhoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongCountry => write!(f, "phone must start with {}", Phone::COUNTRY_PREFIX),
            Self::Malformed => write!(f, "phone must have 9 digits after the country code"),
        }
    }
}

/// Promo code key: trimmed and upper-cased so lookups are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromoKey(String);

impl PromoKey {
    pub fn new(value: &str) -> Option<Self> {
        let value = value.trim().to_uppercase();
        if value.is_empty() || value.len() > 32 { return None; }
        Some(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PromoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
