//! Pricing & discount engine: unit prices and promo codes.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use crate::domain::aggregates::{DiscountBreakdown, LineItem, NewPromoCode, Order, Product, PromoCode, PromoError};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Money, PromoKey};
use crate::notify::{self, Notifier};
use crate::store::Store;
use crate::{MarketError, Result};

/// Wholesale price when present, retail otherwise.
pub fn unit_price(product: &Product) -> Money { product.unit_price() }

#[derive(Clone)]
pub struct PricingEngine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

fn invalid(e: PromoError) -> MarketError { MarketError::PromoInvalid(e.to_string()) }

fn key(code: &str) -> Result<PromoKey> {
    PromoKey::new(code).ok_or_else(|| MarketError::PromoNotFound(code.trim().to_string()))
}

impl PricingEngine {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self { Self { store, notifier } }

    #[instrument(skip(self, new), fields(code = %new.code))]
    pub async fn create_promo(&self, new: NewPromoCode) -> Result<PromoCode> {
        let promo = PromoCode::create(new).map_err(|e| MarketError::Validation(e.to_string()))?;
        self.store.insert_promo(&promo).await?;
        tracing::info!(code = %promo.code, "promo code created");
        notify::dispatch(self.notifier.as_ref(), DomainEvent::Promotion(promo.to_event())).await;
        Ok(promo)
    }

    async fn find(&self, key: &PromoKey) -> Result<PromoCode> {
        self.store.find_promo(key).await?.ok_or_else(|| MarketError::PromoNotFound(key.to_string()))
    }

    /// Read-only: reports the discount `code` would give on `order_amount`.
    pub async fn validate(&self, code: &str, order_amount: Money) -> Result<DiscountBreakdown> {
        let promo = self.find(&key(code)?).await?;
        promo.breakdown(order_amount, Utc::now()).map_err(invalid)
    }

    /// Consumes one use of the code. Validity is re-checked in the same write.
    #[instrument(skip(self))]
    pub async fn apply(&self, code: &str) -> Result<PromoCode> {
        let key = key(code)?;
        let promo = self.find(&key).await?;
        let now = Utc::now();
        if !self.store.increment_promo_usage(&key, now).await? {
            let reason = promo.check_usable(now).err().unwrap_or(PromoError::Exhausted);
            return Err(invalid(reason));
        }
        tracing::info!(code = %key, "promo code applied");
        self.find(&key).await
    }

    /// [`PricingEngine::apply`] on behalf of a placed order. Checkout already
    /// consumed the order's own code, so naming it again changes nothing.
    pub async fn apply_to_order(&self, code: &str, order: &Order) -> Result<PromoCode> {
        let key = key(code)?;
        match &order.promo_code {
            Some(used) if *used == key => {
                tracing::debug!(code = %key, order = %order.order_number, "code already consumed at checkout");
                self.find(&key).await
            }
            Some(other) => Err(MarketError::PromoInvalid(format!("order {} already uses {}", order.order_number, other))),
            None => self.apply(code).await,
        }
    }

    /// Discount for a set of priced lines. Only lines in the code's categories
    /// count toward the discount base; the minimum applies to the whole subtotal.
    pub async fn quote_for_lines(&self, code: &str, lines: &[LineItem]) -> Result<(PromoCode, Money)> {
        let promo = self.find(&key(code)?).await?;
        let subtotal = lines.iter().fold(Money::zero(), |acc, l| acc.add(l.line_total));
        promo.breakdown(subtotal, Utc::now()).map_err(invalid)?;
        let base = lines.iter()
            .filter(|l| promo.applies_to_category(l.category_id))
            .fold(Money::zero(), |acc, l| acc.add(l.line_total));
        if base.is_zero() {
            return Err(MarketError::PromoInvalid("code does not apply to any item in the order".into()));
        }
        let discount = promo.discount_for(base);
        Ok((promo, discount))
    }
}
