//! In-process store used for tests and for running without a database.
//! A single lock makes every trait method one atomic step.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderScope, Page, ProductScope, SellerProfile, Store};
use crate::domain::aggregates::{ApprovalStatus, Category, Order, Product, PromoCode, SellerAccount, StatusChange, Withdrawal, WithdrawalStatus};
use crate::domain::value_objects::{Money, PromoKey};
use crate::{MarketError, Result};

#[derive(Default)]
struct State {
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    promos: HashMap<PromoKey, PromoCode>,
    orders: HashMap<Uuid, Order>,
    sellers: HashMap<Uuid, SellerAccount>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    order_sequence: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Seeds or replaces a seller account wholesale, balance included.
    pub async fn put_seller(&self, seller: SellerAccount) {
        self.state.write().await.sellers.insert(seller.id, seller);
    }
}

fn paginate<T: Clone>(mut items: Vec<T>, page: Page, newest_first: impl Fn(&T, &T) -> std::cmp::Ordering) -> Vec<T> {
    items.sort_by(newest_first);
    items.into_iter().skip(page.offset as usize).take(page.limit as usize).collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_category(&self, category: &Category) -> Result<()> {
        let mut s = self.state.write().await;
        if s.categories.values().any(|c| c.slug == category.slug) {
            return Err(MarketError::Conflict(format!("category '{}' already exists", category.slug)));
        }
        s.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut all: Vec<Category> = self.state.read().await.categories.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn category_exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.read().await.categories.contains_key(&id))
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        self.state.write().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self, scope: ProductScope, page: Page) -> Result<Vec<Product>> {
        let s = self.state.read().await;
        let items = s.products.values().filter(|p| match scope {
            ProductScope::All => true,
            ProductScope::Storefront => p.is_orderable(),
            ProductScope::StorefrontAndSeller(seller) => p.is_orderable() || p.seller_id == seller,
        }).cloned().collect();
        Ok(paginate(items, page, |a, b| b.created_at.cmp(&a.created_at)))
    }

    async fn set_product_approval(&self, id: Uuid, status: ApprovalStatus) -> Result<Option<Product>> {
        let mut s = self.state.write().await;
        Ok(s.products.get_mut(&id).map(|p| { p.set_approval(status); p.clone() }))
    }

    async fn update_product_prices(&self, id: Uuid, retail: Money, wholesale: Option<Money>) -> Result<Option<Product>> {
        let mut s = self.state.write().await;
        Ok(s.products.get_mut(&id).map(|p| {
            p.retail_price = retail;
            p.wholesale_price = wholesale;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn reserve_stock(&self, product_id: Uuid, qty: u32) -> Result<bool> {
        let mut s = self.state.write().await;
        match s.products.get_mut(&product_id) {
            Some(p) if p.is_orderable() => Ok(p.remove_stock(qty).is_ok()),
            _ => Ok(false),
        }
    }

    async fn release_stock(&self, product_id: Uuid, qty: u32) -> Result<()> {
        let mut s = self.state.write().await;
        let product = s.products.get_mut(&product_id).ok_or(MarketError::ProductNotFound(product_id))?;
        product.restore_stock(qty);
        Ok(())
    }

    async fn insert_promo(&self, promo: &PromoCode) -> Result<()> {
        let mut s = self.state.write().await;
        if s.promos.contains_key(&promo.code) {
            return Err(MarketError::Conflict(format!("promo code {} already exists", promo.code)));
        }
        s.promos.insert(promo.code.clone(), promo.clone());
        Ok(())
    }

    async fn find_promo(&self, code: &PromoKey) -> Result<Option<PromoCode>> {
        Ok(self.state.read().await.promos.get(code).cloned())
    }

    async fn increment_promo_usage(&self, code: &PromoKey, now: DateTime<Utc>) -> Result<bool> {
        let mut s = self.state.write().await;
        match s.promos.get_mut(code) {
            Some(p) if p.is_valid_at(now) => { p.used_count += 1; Ok(true) }
            _ => Ok(false),
        }
    }

    async fn release_promo_usage(&self, code: &PromoKey) -> Result<()> {
        if let Some(p) = self.state.write().await.promos.get_mut(code) {
            p.used_count = p.used_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn next_order_sequence(&self) -> Result<u64> {
        let mut s = self.state.write().await;
        s.order_sequence += 1;
        Ok(s.order_sequence)
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut s = self.state.write().await;
        if s.orders.values().any(|o| o.order_number == order.order_number) {
            return Err(MarketError::Conflict(format!("order number {} already used", order.order_number)));
        }
        s.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, scope: OrderScope, page: Page) -> Result<Vec<Order>> {
        let s = self.state.read().await;
        let items = s.orders.values().filter(|o| match scope {
            OrderScope::All => true,
            OrderScope::Customer(user) => o.is_owned_by(user),
            OrderScope::Seller(seller) => o.involves_seller(seller),
        }).cloned().collect();
        Ok(paginate(items, page, |a, b| b.created_at.cmp(&a.created_at)))
    }

    async fn update_order_status(&self, id: Uuid, change: &StatusChange, transaction_id: Option<&str>, now: DateTime<Utc>) -> Result<Option<Order>> {
        let mut s = self.state.write().await;
        let Some(order) = s.orders.get_mut(&id) else { return Ok(None) };
        if order.order_status != change.from_order || order.payment_status != change.from_payment {
            return Ok(None);
        }
        order.apply_status_change(change, now);
        if let Some(tx) = transaction_id {
            order.payment_transaction_id = Some(tx.to_string());
        }
        Ok(Some(order.clone()))
    }

    async fn set_payment_url(&self, id: Uuid, url: &str) -> Result<()> {
        let mut s = self.state.write().await;
        let order = s.orders.get_mut(&id).ok_or(MarketError::OrderNotFound(id))?;
        order.payment_url = Some(url.to_string());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn deliver_order(&self, id: Uuid, change: &StatusChange, credits: &[(Uuid, Money)], now: DateTime<Utc>) -> Result<Option<Order>> {
        let mut guard = self.state.write().await;
        let s = &mut *guard;
        let Some(order) = s.orders.get_mut(&id) else { return Ok(None) };
        if order.order_status != change.from_order || order.payment_status != change.from_payment {
            return Ok(None);
        }
        if let Some((missing, _)) = credits.iter().find(|(seller, _)| !s.sellers.contains_key(seller)) {
            return Err(MarketError::SellerNotFound(*missing));
        }
        order.apply_status_change(change, now);
        if order.settled_at.is_none() {
            order.settled_at = Some(now);
            for (seller_id, amount) in credits {
                if let Some(seller) = s.sellers.get_mut(seller_id) {
                    seller.balance = seller.balance.add(*amount);
                }
            }
        }
        Ok(Some(order.clone()))
    }

    async fn cancel_order(&self, id: Uuid, change: &StatusChange, now: DateTime<Utc>) -> Result<Option<Order>> {
        let mut guard = self.state.write().await;
        let s = &mut *guard;
        let Some(order) = s.orders.get_mut(&id) else { return Ok(None) };
        if order.order_status != change.from_order || order.payment_status != change.from_payment {
            return Ok(None);
        }
        if let Some(missing) = order.items.iter().find(|i| !s.products.contains_key(&i.product_id)) {
            return Err(MarketError::ProductNotFound(missing.product_id));
        }
        order.apply_status_change(change, now);
        for item in &order.items {
            if let Some(product) = s.products.get_mut(&item.product_id) {
                product.restore_stock(item.quantity);
            }
        }
        Ok(Some(order.clone()))
    }

    async fn get_seller(&self, id: Uuid) -> Result<Option<SellerAccount>> {
        Ok(self.state.read().await.sellers.get(&id).cloned())
    }

    async fn upsert_seller_profile(&self, id: Uuid, profile: &SellerProfile, default_commission: Decimal) -> Result<SellerAccount> {
        let mut s = self.state.write().await;
        let seller = s.sellers.entry(id).or_insert_with(|| SellerAccount::new(id, profile.name.clone(), default_commission));
        seller.name = profile.name.clone();
        seller.bank_account = profile.bank_account.clone();
        seller.bank_name = profile.bank_name.clone();
        Ok(seller.clone())
    }

    async fn pending_withdrawal_total(&self, seller_id: Uuid) -> Result<Money> {
        let s = self.state.read().await;
        Ok(s.withdrawals.values()
            .filter(|w| w.seller_id == seller_id && w.status == WithdrawalStatus::Pending)
            .fold(Money::zero(), |acc, w| acc.add(w.amount)))
    }

    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<()> {
        let mut s = self.state.write().await;
        let seller = s.sellers.get(&withdrawal.seller_id).ok_or(MarketError::SellerNotFound(withdrawal.seller_id))?;
        let reserved = s.withdrawals.values()
            .filter(|w| w.seller_id == withdrawal.seller_id && w.status == WithdrawalStatus::Pending)
            .fold(Money::zero(), |acc, w| acc.add(w.amount));
        let available = seller.balance.saturating_sub(reserved);
        if available < withdrawal.amount {
            return Err(MarketError::InsufficientBalance { requested: withdrawal.amount.amount(), available: available.amount() });
        }
        s.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(())
    }

    async fn get_withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>> {
        Ok(self.state.read().await.withdrawals.get(&id).cloned())
    }

    async fn list_withdrawals(&self, seller_id: Option<Uuid>, page: Page) -> Result<Vec<Withdrawal>> {
        let s = self.state.read().await;
        let items = s.withdrawals.values().filter(|w| seller_id.map_or(true, |id| w.seller_id == id)).cloned().collect();
        Ok(paginate(items, page, |a, b| b.created_at.cmp(&a.created_at)))
    }

    async fn approve_withdrawal(&self, id: Uuid, admin: Uuid, now: DateTime<Utc>) -> Result<Withdrawal> {
        let mut guard = self.state.write().await;
        let s = &mut *guard;
        let withdrawal = s.withdrawals.get_mut(&id).ok_or(MarketError::WithdrawalNotFound(id))?;
        if withdrawal.status != WithdrawalStatus::Pending { return Err(MarketError::AlreadyProcessed); }
        let seller = s.sellers.get_mut(&withdrawal.seller_id).ok_or(MarketError::SellerNotFound(withdrawal.seller_id))?;
        if seller.balance < withdrawal.amount {
            return Err(MarketError::InsufficientBalance { requested: withdrawal.amount.amount(), available: seller.balance.amount() });
        }
        withdrawal.approve(admin, now)?;
        seller.balance = seller.balance.saturating_sub(withdrawal.amount);
        Ok(withdrawal.clone())
    }

    async fn reject_withdrawal(&self, id: Uuid, admin: Uuid, reason: Option<&str>, now: DateTime<Utc>) -> Result<Withdrawal> {
        let mut s = self.state.write().await;
        let withdrawal = s.withdrawals.get_mut(&id).ok_or(MarketError::WithdrawalNotFound(id))?;
        withdrawal.reject(admin, reason.map(str::to_string), now)?;
        Ok(withdrawal.clone())
    }

    async fn complete_withdrawal(&self, id: Uuid, now: DateTime<Utc>) -> Result<Withdrawal> {
        let mut s = self.state.write().await;
        let withdrawal = s.withdrawals.get_mut(&id).ok_or(MarketError::WithdrawalNotFound(id))?;
        withdrawal.complete(now)?;
        Ok(withdrawal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::withdrawal::sample_seller;
    use crate::domain::aggregates::{order, product, LineItem, OrderStatus};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reserve_is_conditional() {
        let store = MemoryStore::new();
        let p = product::sample(5, 100, None);
        store.insert_product(&p).await.unwrap();
        assert!(store.reserve_stock(p.id, 5).await.unwrap());
        assert!(!store.reserve_stock(p.id, 1).await.unwrap());
        store.release_stock(p.id, 2).await.unwrap();
        let after = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!((after.stock, after.sold_count), (2, 3));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversell() {
        let store = Arc::new(MemoryStore::new());
        let p = product::sample(10, 100, None);
        store.insert_product(&p).await.unwrap();
        let product_id = p.id;
        let handles: Vec<_> = (0..25).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.reserve_stock(product_id, 1).await.unwrap() })
        }).collect();
        let mut granted = 0;
        for h in handles { if h.await.unwrap() { granted += 1; } }
        assert_eq!(granted, 10);
        assert_eq!(store.get_product(p.id).await.unwrap().unwrap().stock, 0);
    }

    async fn placed_order(store: &MemoryStore, lines: &[(&Product, u32)]) -> Order {
        let items = lines.iter().map(|(p, qty)| LineItem::new(p.id, p.seller_id, None, p.name.clone(), *qty, p.unit_price())).collect();
        let o = Order::place("ORD-20260101-000001".into(), order::sample_draft(items)).unwrap();
        store.insert_order(&o).await.unwrap();
        o
    }

    #[tokio::test]
    async fn test_cancel_is_all_or_nothing() {
        let store = MemoryStore::new();
        let kept = product::sample(10, 100, None);
        store.insert_product(&kept).await.unwrap();
        store.reserve_stock(kept.id, 4).await.unwrap();
        let unknown = product::sample(10, 100, None);
        let o = placed_order(&store, &[(&kept, 4), (&unknown, 2)]).await;
        let change = o.plan_status_change(Some(OrderStatus::Cancelled), None).unwrap();

        assert!(matches!(store.cancel_order(o.id, &change, Utc::now()).await, Err(MarketError::ProductNotFound(id)) if id == unknown.id));
        assert_eq!(store.get_order(o.id).await.unwrap().unwrap().order_status, OrderStatus::Pending);
        assert_eq!(store.get_product(kept.id).await.unwrap().unwrap().stock, 6);

        store.insert_product(&unknown).await.unwrap();
        let cancelled = store.cancel_order(o.id, &change, Utc::now()).await.unwrap().unwrap();
        assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
        assert_eq!(store.get_product(kept.id).await.unwrap().unwrap().stock, 10);
        assert!(store.cancel_order(o.id, &change, Utc::now()).await.unwrap().is_none());
        assert_eq!(store.get_product(kept.id).await.unwrap().unwrap().stock, 10);
    }

    #[tokio::test]
    async fn test_delivery_and_credit_are_one_step() {
        let store = MemoryStore::new();
        let p = product::sample(10, 100, None);
        store.insert_product(&p).await.unwrap();
        let o = placed_order(&store, &[(&p, 3)]).await;
        let change = o.plan_status_change(Some(OrderStatus::Delivered), None).unwrap();
        let credits = [(p.seller_id, Money::from_major(270))];

        assert!(matches!(store.deliver_order(o.id, &change, &credits, Utc::now()).await, Err(MarketError::SellerNotFound(_))));
        let untouched = store.get_order(o.id).await.unwrap().unwrap();
        assert_eq!((untouched.order_status, untouched.settled_at), (OrderStatus::Pending, None));

        let mut seller = sample_seller(0);
        seller.id = p.seller_id;
        store.put_seller(seller).await;
        let delivered = store.deliver_order(o.id, &change, &credits, Utc::now()).await.unwrap().unwrap();
        assert!(delivered.settled_at.is_some() && delivered.delivered_at.is_some());
        assert!(store.deliver_order(o.id, &change, &credits, Utc::now()).await.unwrap().is_none());
        assert_eq!(store.get_seller(p.seller_id).await.unwrap().unwrap().balance, Money::from_major(270));
    }

    #[tokio::test]
    async fn test_withdrawal_insert_respects_pending_reservations() {
        let store = Arc::new(MemoryStore::new());
        let seller = sample_seller(250_000);
        store.put_seller(seller.clone()).await;
        let handles: Vec<_> = (0..8).map(|_| {
            let store = store.clone();
            let w = Withdrawal::request(&seller, Money::from_major(150_000), None).unwrap();
            tokio::spawn(async move { store.insert_withdrawal(&w).await })
        }).collect();
        let mut inserted = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => inserted += 1,
                Err(e) => assert!(matches!(e, MarketError::InsufficientBalance { .. })),
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.pending_withdrawal_total(seller.id).await.unwrap(), Money::from_major(150_000));
    }

    #[tokio::test]
    async fn test_order_sequence_monotonic() {
        let store = MemoryStore::new();
        let a = store.next_order_sequence().await.unwrap();
        let b = store.next_order_sequence().await.unwrap();
        assert!(b > a);
    }
}
