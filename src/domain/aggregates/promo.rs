//! PromoCode Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::PromotionEvent;
use crate::domain::text_enum;
use crate::domain::value_objects::{Money, PromoKey};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PromoCode {
    pub id: Uuid,
    pub code: PromoKey,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Money,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_uses: Option<u32>,
    pub used_count: u32,
    pub applicable_categories: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType { Percentage, Fixed }

text_enum!(DiscountType { Percentage => "percentage", Fixed => "fixed" });

#[derive(Clone, Debug)]
pub struct NewPromoCode {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_order_amount: Money,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_uses: Option<u32>,
    pub applicable_categories: Vec<Uuid>,
}

/// Result of checking a code against an order amount.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DiscountBreakdown {
    pub code: PromoKey,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub discount_amount: Money,
    pub final_amount: Money,
}

impl PromoCode {
    pub fn create(new: NewPromoCode) -> Result<Self, PromoError> {
        let code = PromoKey::new(&new.code).ok_or(PromoError::MalformedCode)?;
        if new.discount_value <= Decimal::ZERO { return Err(PromoError::NonPositiveValue); }
        if new.discount_type == DiscountType::Percentage && new.discount_value > Decimal::ONE_HUNDRED {
            return Err(PromoError::PercentageAboveHundred);
        }
        if new.valid_until <= new.valid_from { return Err(PromoError::EmptyWindow); }
        Ok(Self {
            id: Uuid::now_v7(), code, description: new.description, discount_type: new.discount_type,
            discount_value: new.discount_value, min_order_amount: new.min_order_amount,
            valid_from: new.valid_from, valid_until: new.valid_until, max_uses: new.max_uses, used_count: 0,
            applicable_categories: new.applicable_categories, is_active: true, created_at: Utc::now(),
        })
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool { self.check_usable(now).is_ok() }

    /// Window, active flag and usage cap.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), PromoError> {
        if !self.is_active { return Err(PromoError::Inactive); }
        if now < self.valid_from { return Err(PromoError::NotStarted); }
        if now > self.valid_until { return Err(PromoError::Expired); }
        if self.max_uses.is_some_and(|cap| self.used_count >= cap) { return Err(PromoError::Exhausted); }
        Ok(())
    }

    /// Discount on `subtotal`, never more than the subtotal itself.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let raw = match self.discount_type {
            DiscountType::Percentage => subtotal.percentage(self.discount_value),
            DiscountType::Fixed => Money::new(self.discount_value),
        };
        raw.min(subtotal)
    }

    pub fn applies_to_category(&self, category: Option<Uuid>) -> bool {
        self.applicable_categories.is_empty() || category.is_some_and(|c| self.applicable_categories.contains(&c))
    }

    pub fn breakdown(&self, order_amount: Money, now: DateTime<Utc>) -> Result<DiscountBreakdown, PromoError> {
        self.check_usable(now)?;
        if order_amount < self.min_order_amount { return Err(PromoError::BelowMinimumOrder(self.min_order_amount)); }
        let discount_amount = self.discount_for(order_amount);
        Ok(DiscountBreakdown {
            code: self.code.clone(), discount_type: self.discount_type, discount_value: self.discount_value,
            discount_amount, final_amount: order_amount.saturating_sub(discount_amount),
        })
    }

    pub fn to_event(&self) -> PromotionEvent {
        PromotionEvent { code: self.code.to_string(), discount_type: self.discount_type.as_str(), discount_value: self.discount_value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoError { MalformedCode, NonPositiveValue, PercentageAboveHundred, EmptyWindow, Inactive, NotStarted, Expired, Exhausted, BelowMinimumOrder(Money) }
impl std::error::Error for PromoError {}
impl std::fmt::Display for PromoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedCode => write!(f, "code must be 1-32 characters"),
            Self::NonPositiveValue => write!(f, "discount value must be positive"),
            Self::PercentageAboveHundred => write!(f, "percentage discount cannot exceed 100"),
            Self::EmptyWindow => write!(f, "validity window is empty"),
            Self::Inactive => write!(f, "code is disabled"),
            Self::NotStarted => write!(f, "code is not active yet"),
            Self::Expired => write!(f, "code has expired"),
            Self::Exhausted => write!(f, "usage limit reached"),
            Self::BelowMinimumOrder(min) => write!(f, "minimum order amount is {}", min),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample(code: &str, discount_type: DiscountType, value: i64) -> PromoCode {
    let now = Utc::now();
    PromoCode::create(NewPromoCode {
        code: code.into(), description: None, discount_type, discount_value: Decimal::from(value),
        min_order_amount: Money::zero(), valid_from: now - chrono::Duration::days(1),
        valid_until: now + chrono::Duration::days(30), max_uses: None, applicable_categories: vec![],
    }).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_percentage_discount() {
        let p = sample("save10", DiscountType::Percentage, 10);
        assert_eq!(p.code.as_str(), "SAVE10");
        let b = p.breakdown(Money::from_major(5000), Utc::now()).unwrap();
        assert_eq!(b.discount_amount, Money::from_major(500));
        assert_eq!(b.final_amount, Money::from_major(4500));
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        let p = sample("FLAT", DiscountType::Fixed, 20_000);
        assert_eq!(p.discount_for(Money::from_major(15_000)), Money::from_major(15_000));
        assert_eq!(p.discount_for(Money::from_major(50_000)), Money::from_major(20_000));
    }

    #[test]
    fn test_window_and_cap() {
        let mut p = sample("X", DiscountType::Fixed, 1);
        assert_eq!(p.check_usable(p.valid_until + Duration::seconds(1)), Err(PromoError::Expired));
        assert_eq!(p.check_usable(p.valid_from - Duration::seconds(1)), Err(PromoError::NotStarted));
        p.max_uses = Some(2);
        p.used_count = 2;
        assert_eq!(p.check_usable(Utc::now()), Err(PromoError::Exhausted));
    }

    #[test]
    fn test_minimum_order_amount() {
        let mut p = sample("MIN", DiscountType::Percentage, 5);
        p.min_order_amount = Money::from_major(10_000);
        assert!(matches!(p.breakdown(Money::from_major(9_999), Utc::now()), Err(PromoError::BelowMinimumOrder(_))));
    }

    #[test]
    fn test_percentage_over_hundred_rejected() {
        let now = Utc::now();
        let err = PromoCode::create(NewPromoCode {
            code: "BIG".into(), description: None, discount_type: DiscountType::Percentage, discount_value: Decimal::from(150),
            min_order_amount: Money::zero(), valid_from: now, valid_until: now + Duration::days(1), max_uses: None, applicable_categories: vec![],
        }).unwrap_err();
        assert_eq!(err, PromoError::PercentageAboveHundred);
    }

    #[test]
    fn test_category_scope() {
        let cat = Uuid::now_v7();
        let mut p = sample("CAT", DiscountType::Percentage, 10);
        assert!(p.applies_to_category(None));
        p.applicable_categories = vec![cat];
        assert!(p.applies_to_category(Some(cat)));
        assert!(!p.applies_to_category(None));
    }
}
