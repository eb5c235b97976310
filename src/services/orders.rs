//! Order lifecycle: checkout, status updates and cancellation.
//!
//! Checkout reserves stock with conditional decrements before the order row
//! exists. Any failure after the first reservation releases everything taken
//! so far, so stock is never left decremented without a persisted order.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::{Principal, Role};
use crate::domain::aggregates::order::format_order_number;
use crate::domain::aggregates::{CustomerInfo, LineItem, Order, OrderDraft, OrderStatus, PaymentMethod, PaymentStatus, PromoCode, ShippingAddress};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Money, PromoKey};
use crate::notify::{self, Notifier};
use crate::services::ledger::SellerLedger;
use crate::services::pricing::{self, PricingEngine};
use crate::store::{OrderScope, Page, Store};
use crate::{MarketError, Result};

#[derive(Clone, Debug)]
pub struct CartLine { pub product_id: Uuid, pub quantity: u32 }

#[derive(Clone, Debug)]
pub struct Checkout {
    pub user_id: Option<Uuid>,
    pub items: Vec<CartLine>,
    pub customer: CustomerInfo,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub promo_code: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    pricing: PricingEngine,
    ledger: SellerLedger,
    shipping_price: Money,
}

/// What checkout has taken so far and must give back on failure.
#[derive(Default)]
struct Reservations { stock: Vec<(Uuid, u32)>, promo: Option<PromoKey> }

impl OrderService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, pricing: PricingEngine, ledger: SellerLedger, shipping_price: Money) -> Self {
        Self { store, notifier, pricing, ledger, shipping_price }
    }

    #[instrument(skip(self, checkout), fields(lines = checkout.items.len()))]
    pub async fn create_order(&self, checkout: Checkout) -> Result<Order> {
        let lines = merge_lines(&checkout.items)?;
        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = self.store.get_product(line.product_id).await?.ok_or(MarketError::ProductNotFound(line.product_id))?;
            product.check_order_quantity(line.quantity)?;
            items.push(LineItem::new(product.id, product.seller_id, product.category_id, product.name.clone(), line.quantity, pricing::unit_price(&product)));
        }
        let quote = match checkout.promo_code.as_deref() {
            Some(code) => Some(self.pricing.quote_for_lines(code, &items).await?),
            None => None,
        };

        let mut taken = Reservations::default();
        let placed = self.reserve_and_persist(&checkout, items, quote, &mut taken).await;
        let order = match placed {
            Ok(order) => order,
            Err(e) => {
                self.release(&taken).await;
                return Err(e);
            }
        };
        tracing::info!(order = %order.order_number, total = %order.total_price, "order created");
        notify::dispatch(self.notifier.as_ref(), DomainEvent::NewOrder(order.to_event())).await;
        Ok(order)
    }

    async fn reserve_and_persist(
        &self,
        checkout: &Checkout,
        items: Vec<LineItem>,
        quote: Option<(PromoCode, Money)>,
        taken: &mut Reservations,
    ) -> Result<Order> {
        for item in &items {
            if !self.store.reserve_stock(item.product_id, item.quantity).await? {
                let available = self.store.get_product(item.product_id).await?.map_or(0, |p| p.stock);
                return Err(MarketError::OutOfStock { product: item.name.clone(), requested: item.quantity, available });
            }
            taken.stock.push((item.product_id, item.quantity));
        }
        let (promo_code, discount_amount) = match quote {
            Some((promo, discount)) => {
                if !self.store.increment_promo_usage(&promo.code, Utc::now()).await? {
                    return Err(MarketError::PromoInvalid(format!("{} is no longer valid", promo.code)));
                }
                taken.promo = Some(promo.code.clone());
                (Some(promo.code), discount)
            }
            None => (None, Money::zero()),
        };
        let sequence = self.store.next_order_sequence().await?;
        let order = Order::place(format_order_number(Utc::now(), sequence), OrderDraft {
            user_id: checkout.user_id, items, customer: checkout.customer.clone(),
            shipping_address: checkout.shipping_address.clone(), payment_method: checkout.payment_method,
            shipping_price: self.shipping_price, discount_amount, promo_code,
        })?;
        self.store.insert_order(&order).await?;
        Ok(order)
    }

    async fn release(&self, taken: &Reservations) {
        for (product_id, qty) in &taken.stock {
            if let Err(e) = self.store.release_stock(*product_id, *qty).await {
                tracing::error!(product = %product_id, qty, error = %e, "failed to release reserved stock");
            }
        }
        if let Some(code) = &taken.promo {
            if let Err(e) = self.store.release_promo_usage(code).await {
                tracing::error!(code = %code, error = %e, "failed to release promo usage");
            }
        }
    }

    async fn load(&self, id: Uuid) -> Result<Order> {
        self.store.get_order(id).await?.ok_or(MarketError::OrderNotFound(id))
    }

    fn can_view(order: &Order, principal: &Principal) -> bool {
        principal.is_admin() || order.is_owned_by(principal.id) || (principal.role == Role::Seller && order.involves_seller(principal.id))
    }

    pub async fn get_order(&self, id: Uuid, principal: Principal) -> Result<Order> {
        let order = self.load(id).await?;
        if !Self::can_view(&order, &principal) { return Err(MarketError::Forbidden); }
        Ok(order)
    }

    pub async fn list_orders(&self, principal: Principal, page: Page) -> Result<Vec<Order>> {
        let scope = match principal.role {
            Role::Admin => OrderScope::All,
            Role::Seller => OrderScope::Seller(principal.id),
            Role::Customer => OrderScope::Customer(principal.id),
        };
        self.store.list_orders(scope, page).await
    }

    /// Admin, or a seller with goods in the order. Illegal moves on either
    /// status axis are rejected; a concurrent change surfaces as `Conflict`.
    #[instrument(skip(self, principal))]
    pub async fn update_status(&self, id: Uuid, principal: Principal, order_status: Option<OrderStatus>, payment_status: Option<PaymentStatus>) -> Result<Order> {
        if order_status.is_none() && payment_status.is_none() {
            return Err(MarketError::Validation("orderStatus or paymentStatus is required".into()));
        }
        let order = self.load(id).await?;
        let permitted = principal.is_admin() || (principal.role == Role::Seller && order.involves_seller(principal.id));
        if !permitted { return Err(MarketError::Forbidden); }
        if order_status == Some(OrderStatus::Cancelled) {
            return Err(MarketError::Validation("use order cancellation to cancel an order".into()));
        }
        let change = order.plan_status_change(order_status, payment_status)?;
        if change.is_noop() { return Ok(order); }
        let now = Utc::now();
        let written = if change.becomes_delivered() {
            let credits = self.ledger.settlement_credits(&order).await?;
            self.store.deliver_order(id, &change, &credits, now).await?
        } else {
            self.store.update_order_status(id, &change, None, now).await?
        };
        let updated = written.ok_or_else(|| MarketError::Conflict(format!("order {} changed concurrently", order.order_number)))?;
        tracing::info!(order = %updated.order_number, order_status = %updated.order_status, payment_status = %updated.payment_status, "order status updated");
        notify::dispatch(self.notifier.as_ref(), DomainEvent::StatusChange(updated.to_event())).await;
        Ok(updated)
    }

    /// Owner or admin, pending orders only. Restores exactly the stock checkout took.
    #[instrument(skip(self, principal))]
    pub async fn cancel_order(&self, id: Uuid, principal: Principal) -> Result<Order> {
        let order = self.load(id).await?;
        if !(principal.is_admin() || order.is_owned_by(principal.id)) { return Err(MarketError::Forbidden); }
        if order.order_status != OrderStatus::Pending {
            return Err(MarketError::InvalidState(format!("only pending orders can be cancelled; order is {}", order.order_status)));
        }
        let change = order.plan_status_change(Some(OrderStatus::Cancelled), None)?;
        let Some(cancelled) = self.store.cancel_order(id, &change, Utc::now()).await? else {
            return Err(MarketError::InvalidState("order is no longer pending".into()));
        };
        tracing::info!(order = %cancelled.order_number, "order cancelled, stock restored");
        notify::dispatch(self.notifier.as_ref(), DomainEvent::StatusChange(cancelled.to_event())).await;
        Ok(cancelled)
    }
}

/// Rejects empty carts and zero quantities; repeated products are summed.
fn merge_lines(lines: &[CartLine]) -> Result<Vec<CartLine>> {
    if lines.is_empty() { return Err(MarketError::Validation("order must contain at least one item".into())); }
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 { return Err(MarketError::Validation("quantity must be at least 1".into())); }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity)
                    .ok_or_else(|| MarketError::Validation("quantity is too large".into()))?;
            }
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::withdrawal::sample_seller;
    use crate::domain::aggregates::{order, product, promo, DiscountType, Product};
    use crate::notify::testing::{FailingNotifier, RecordingNotifier};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    struct Fixture { service: OrderService, store: Arc<MemoryStore>, notifier: Arc<RecordingNotifier> }

    fn fixture_with(notifier: Arc<dyn Notifier>) -> (OrderService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pricing = PricingEngine::new(store.clone(), notifier.clone());
        let ledger = SellerLedger::new(store.clone(), notifier.clone(), Money::from_major(100_000), Decimal::from(10));
        (OrderService::new(store.clone(), notifier, pricing, ledger, Money::zero()), store)
    }

    fn fixture() -> Fixture {
        let notifier = Arc::new(RecordingNotifier::default());
        let (service, store) = fixture_with(notifier.clone());
        Fixture { service, store, notifier }
    }

    async fn stocked(store: &MemoryStore, stock: u32, retail: i64, wholesale: Option<i64>) -> Product {
        let p = product::sample(stock, retail, wholesale);
        store.insert_product(&p).await.unwrap();
        let mut seller = sample_seller(0);
        seller.id = p.seller_id;
        store.put_seller(seller).await;
        p
    }

    fn checkout(user: Uuid, lines: Vec<(Uuid, u32)>) -> Checkout {
        let draft = order::sample_draft(vec![]);
        Checkout {
            user_id: Some(user), items: lines.into_iter().map(|(product_id, quantity)| CartLine { product_id, quantity }).collect(),
            customer: draft.customer, shipping_address: draft.shipping_address, payment_method: PaymentMethod::Click, promo_code: None,
        }
    }

    fn customer(id: Uuid) -> Principal { Principal { id, role: Role::Customer } }
    fn admin() -> Principal { Principal { id: Uuid::now_v7(), role: Role::Admin } }

    async fn stock_of(store: &MemoryStore, id: Uuid) -> u32 { store.get_product(id).await.unwrap().unwrap().stock }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let f = fixture();
        let p = stocked(&f.store, 10, 1000, Some(900)).await;
        let user = Uuid::now_v7();
        let o = f.service.create_order(checkout(user, vec![(p.id, 3)])).await.unwrap();
        assert_eq!(stock_of(&f.store, p.id).await, 7);
        assert_eq!(o.total_price, Money::from_major(2700));
        assert_eq!(o.items[0].line_total, Money::from_major(2700));

        let paid = f.service.update_status(o.id, admin(), None, Some(PaymentStatus::Paid)).await.unwrap();
        assert!(paid.paid_at.is_some());
        assert_eq!(paid.order_status, OrderStatus::Pending);

        f.service.update_status(o.id, admin(), Some(OrderStatus::Confirmed), None).await.unwrap();
        assert!(matches!(f.service.cancel_order(o.id, customer(user)).await, Err(MarketError::InvalidState(_))));
        assert_eq!(stock_of(&f.store, p.id).await, 7);
        assert_eq!(*f.notifier.events.lock().await, vec!["new_order", "status_change", "status_change"]);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_exactly() {
        let f = fixture();
        let a = stocked(&f.store, 10, 500, None).await;
        let b = stocked(&f.store, 4, 200, Some(150)).await;
        let user = Uuid::now_v7();
        let o = f.service.create_order(checkout(user, vec![(a.id, 6), (b.id, 4)])).await.unwrap();
        assert_eq!((stock_of(&f.store, a.id).await, stock_of(&f.store, b.id).await), (4, 0));
        let cancelled = f.service.cancel_order(o.id, customer(user)).await.unwrap();
        assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!((stock_of(&f.store, a.id).await, stock_of(&f.store, b.id).await), (10, 4));
        assert!(matches!(f.service.cancel_order(o.id, customer(user)).await, Err(MarketError::InvalidState(_))));
        assert_eq!(stock_of(&f.store, a.id).await, 10);
    }

    #[tokio::test]
    async fn test_cancel_requires_owner_or_admin() {
        let f = fixture();
        let p = stocked(&f.store, 10, 100, None).await;
        let o = f.service.create_order(checkout(Uuid::now_v7(), vec![(p.id, 1)])).await.unwrap();
        assert!(matches!(f.service.cancel_order(o.id, customer(Uuid::now_v7())).await, Err(MarketError::Forbidden)));
        assert!(f.service.cancel_order(o.id, admin()).await.is_ok());
        assert!(matches!(f.service.cancel_order(Uuid::now_v7(), admin()).await, Err(MarketError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_out_of_stock_reports_availability() {
        let f = fixture();
        let plenty = stocked(&f.store, 10, 100, None).await;
        let scarce = stocked(&f.store, 2, 100, None).await;
        f.store.reserve_stock(scarce.id, 1).await.unwrap();
        let err = f.service.create_order(checkout(Uuid::now_v7(), vec![(plenty.id, 5), (scarce.id, 2)])).await.unwrap_err();
        assert!(matches!(err, MarketError::OutOfStock { requested: 2, available: 1, .. }));
        assert_eq!(stock_of(&f.store, plenty.id).await, 10);
        assert!(f.store.list_orders(OrderScope::All, Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_late_failure_releases_reservations() {
        let f = fixture();
        let a = stocked(&f.store, 10, 1000, None).await;
        let b = stocked(&f.store, 5, 200, None).await;
        let mut capped = promo::sample("LAST", DiscountType::Fixed, 100);
        capped.max_uses = Some(1);
        f.store.insert_promo(&capped).await.unwrap();
        let c = checkout(Uuid::now_v7(), vec![(a.id, 4), (b.id, 5)]);
        let items = vec![
            LineItem::new(a.id, a.seller_id, None, a.name.clone(), 4, a.unit_price()),
            LineItem::new(b.id, b.seller_id, None, b.name.clone(), 5, b.unit_price()),
        ];
        let quote = f.service.pricing.quote_for_lines("LAST", &items).await.unwrap();
        // Another checkout takes the last use between quoting and reserving.
        assert!(f.store.increment_promo_usage(&capped.code, Utc::now()).await.unwrap());

        let mut taken = Reservations::default();
        let err = f.service.reserve_and_persist(&c, items, Some(quote), &mut taken).await.unwrap_err();
        assert!(matches!(err, MarketError::PromoInvalid(_)));
        assert_eq!(taken.stock.len(), 2);
        assert_eq!(stock_of(&f.store, b.id).await, 0);
        f.service.release(&taken).await;
        assert_eq!((stock_of(&f.store, a.id).await, stock_of(&f.store, b.id).await), (10, 5));
        assert_eq!(f.store.find_promo(&capped.code).await.unwrap().unwrap().used_count, 1);
    }

    #[tokio::test]
    async fn test_missing_product_and_bad_quantities() {
        let f = fixture();
        let p = stocked(&f.store, 3, 100, None).await;
        let user = Uuid::now_v7();
        assert!(matches!(f.service.create_order(checkout(user, vec![(Uuid::now_v7(), 1)])).await, Err(MarketError::ProductNotFound(_))));
        assert!(matches!(f.service.create_order(checkout(user, vec![(p.id, 0)])).await, Err(MarketError::Validation(_))));
        assert!(matches!(f.service.create_order(checkout(user, vec![])).await, Err(MarketError::Validation(_))));
        assert!(matches!(f.service.create_order(checkout(user, vec![(p.id, 2), (p.id, 2)])).await, Err(MarketError::OutOfStock { requested: 4, .. })));
        assert_eq!(stock_of(&f.store, p.id).await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_orders_exhaust_without_oversell() {
        let f = fixture();
        let p = stocked(&f.store, 10, 100, None).await;
        let handles: Vec<_> = (0..12).map(|_| {
            let service = f.service.clone();
            let c = checkout(Uuid::now_v7(), vec![(p.id, 3)]);
            tokio::spawn(async move { service.create_order(c).await })
        }).collect();
        let mut placed = 0u32;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => placed += 1,
                Err(e) => assert!(matches!(e, MarketError::OutOfStock { .. })),
            }
        }
        assert_eq!(placed, 3);
        assert_eq!(stock_of(&f.store, p.id).await, 1);
    }

    #[tokio::test]
    async fn test_stock_conservation_over_mixed_sequence() {
        let f = fixture();
        let p = stocked(&f.store, 50, 100, None).await;
        let user = Uuid::now_v7();
        let mut live = 0u32;
        for (i, qty) in [5u32, 7, 3, 9, 4].into_iter().enumerate() {
            let o = f.service.create_order(checkout(user, vec![(p.id, qty)])).await.unwrap();
            if i % 2 == 0 { f.service.cancel_order(o.id, customer(user)).await.unwrap(); } else { live += qty; }
        }
        assert_eq!(stock_of(&f.store, p.id).await, 50 - live);
    }

    #[tokio::test]
    async fn test_snapshot_survives_price_edit() {
        let f = fixture();
        let p = stocked(&f.store, 10, 1000, Some(900)).await;
        let user = Uuid::now_v7();
        let o = f.service.create_order(checkout(user, vec![(p.id, 2)])).await.unwrap();
        f.store.update_product_prices(p.id, Money::from_major(5000), None).await.unwrap();
        let reread = f.service.get_order(o.id, customer(user)).await.unwrap();
        assert_eq!(reread.items[0].unit_price, Money::from_major(900));
        assert_eq!(reread.total_price, Money::from_major(1800));
    }

    #[tokio::test]
    async fn test_promo_applied_once_per_order() {
        let f = fixture();
        let p = stocked(&f.store, 10, 1000, None).await;
        f.store.insert_promo(&promo::sample("SAVE10", DiscountType::Percentage, 10)).await.unwrap();
        let mut c = checkout(Uuid::now_v7(), vec![(p.id, 5)]);
        c.promo_code = Some("save10".into());
        let o = f.service.create_order(c).await.unwrap();
        assert_eq!(o.discount_amount, Money::from_major(500));
        assert_eq!(o.amount_due(), Money::from_major(4500));
        assert_eq!(o.total_price, Money::from_major(5000));
        let used = f.store.find_promo(&PromoKey::new("SAVE10").unwrap()).await.unwrap().unwrap().used_count;
        assert_eq!(used, 1);
    }

    #[tokio::test]
    async fn test_exhausted_promo_rejected_before_reserving() {
        let f = fixture();
        let p = stocked(&f.store, 10, 1000, None).await;
        let mut capped = promo::sample("ONCE", DiscountType::Fixed, 100);
        capped.max_uses = Some(1);
        f.store.insert_promo(&capped).await.unwrap();
        let mut first = checkout(Uuid::now_v7(), vec![(p.id, 1)]);
        first.promo_code = Some("ONCE".into());
        f.service.create_order(first.clone()).await.unwrap();
        assert!(matches!(f.service.create_order(first).await, Err(MarketError::PromoInvalid(_))));
        assert_eq!(stock_of(&f.store, p.id).await, 9);
    }

    #[tokio::test]
    async fn test_illegal_transitions_rejected() {
        let f = fixture();
        let p = stocked(&f.store, 10, 100, None).await;
        let o = f.service.create_order(checkout(Uuid::now_v7(), vec![(p.id, 1)])).await.unwrap();
        f.service.update_status(o.id, admin(), Some(OrderStatus::Delivered), None).await.unwrap();
        assert!(matches!(
            f.service.update_status(o.id, admin(), Some(OrderStatus::Pending), None).await,
            Err(MarketError::InvalidTransition { from: "delivered", to: "pending" })
        ));
        assert!(matches!(
            f.service.update_status(o.id, admin(), None, Some(PaymentStatus::Refunded)).await,
            Err(MarketError::InvalidTransition { .. })
        ));
        assert!(matches!(f.service.update_status(o.id, admin(), None, None).await, Err(MarketError::Validation(_))));
    }

    #[tokio::test]
    async fn test_status_permissions() {
        let f = fixture();
        let p = stocked(&f.store, 10, 100, None).await;
        let user = Uuid::now_v7();
        let o = f.service.create_order(checkout(user, vec![(p.id, 1)])).await.unwrap();
        let owner_seller = Principal { id: p.seller_id, role: Role::Seller };
        let other_seller = Principal { id: Uuid::now_v7(), role: Role::Seller };
        assert!(matches!(f.service.update_status(o.id, customer(user), Some(OrderStatus::Confirmed), None).await, Err(MarketError::Forbidden)));
        assert!(matches!(f.service.update_status(o.id, other_seller, Some(OrderStatus::Confirmed), None).await, Err(MarketError::Forbidden)));
        assert!(f.service.update_status(o.id, owner_seller, Some(OrderStatus::Confirmed), None).await.is_ok());
        assert!(matches!(f.service.get_order(o.id, other_seller).await, Err(MarketError::Forbidden)));
        assert_eq!(f.service.list_orders(owner_seller, Page::default()).await.unwrap().len(), 1);
        assert!(f.service.list_orders(other_seller, Page::default()).await.unwrap().is_empty());
        assert_eq!(f.service.list_orders(customer(user), Page::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_settles_seller_once() {
        let f = fixture();
        let p = stocked(&f.store, 10, 1000, Some(900)).await;
        let o = f.service.create_order(checkout(Uuid::now_v7(), vec![(p.id, 3)])).await.unwrap();
        let delivered = f.service.update_status(o.id, admin(), Some(OrderStatus::Delivered), None).await.unwrap();
        assert!(delivered.delivered_at.is_some());
        let balance = f.store.get_seller(p.seller_id).await.unwrap().unwrap().balance;
        assert_eq!(balance, Money::from_major(2430));
        assert!(delivered.settled_at.is_some());
        let again = f.service.update_status(o.id, admin(), Some(OrderStatus::Delivered), Some(PaymentStatus::Pending)).await.unwrap();
        assert_eq!(again.settled_at, delivered.settled_at);
        assert_eq!(f.store.get_seller(p.seller_id).await.unwrap().unwrap().balance, Money::from_major(2430));
    }

    #[tokio::test]
    async fn test_failed_settlement_keeps_order_undelivered() {
        let f = fixture();
        let p = product::sample(10, 1000, None);
        f.store.insert_product(&p).await.unwrap();
        let o = f.service.create_order(checkout(Uuid::now_v7(), vec![(p.id, 2)])).await.unwrap();
        assert!(matches!(
            f.service.update_status(o.id, admin(), Some(OrderStatus::Delivered), None).await,
            Err(MarketError::SellerNotFound(_))
        ));
        let stored = f.store.get_order(o.id).await.unwrap().unwrap();
        assert_eq!((stored.order_status, stored.settled_at), (OrderStatus::Pending, None));

        let mut seller = sample_seller(0);
        seller.id = p.seller_id;
        f.store.put_seller(seller).await;
        let delivered = f.service.update_status(o.id, admin(), Some(OrderStatus::Delivered), None).await.unwrap();
        assert!(delivered.settled_at.is_some());
        assert_eq!(f.store.get_seller(p.seller_id).await.unwrap().unwrap().balance, Money::from_major(1800));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_order() {
        let (service, store) = fixture_with(Arc::new(FailingNotifier));
        let p = stocked(&store, 5, 100, None).await;
        let o = service.create_order(checkout(Uuid::now_v7(), vec![(p.id, 2)])).await.unwrap();
        assert_eq!(store.get_order(o.id).await.unwrap().unwrap().order_number, o.order_number);
        assert!(o.order_number.starts_with("ORD-"));
    }
}
