//! Persistence seam.
//!
//! Every method that touches a counter or a status is a single atomic
//! conditional write: callers never read a value, change it in memory and
//! write it back.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::aggregates::{ApprovalStatus, Category, Order, Product, PromoCode, SellerAccount, StatusChange, Withdrawal};
use crate::domain::value_objects::{Money, PromoKey};
use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page { pub limit: u32, pub offset: u32 }

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(20).clamp(1, 100);
        Self { limit: per_page, offset: (page - 1) * per_page }
    }
}

impl Default for Page {
    fn default() -> Self { Self::new(None, None) }
}

/// Which orders a listing may return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderScope { All, Customer(Uuid), Seller(Uuid) }

/// Which products a catalog listing may return. `Storefront` is approved,
/// active listings; `StorefrontAndSeller` adds every listing of that seller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProductScope { All, Storefront, StorefrontAndSeller(Uuid) }

/// Seller-editable profile fields.
#[derive(Clone, Debug)]
pub struct SellerProfile { pub name: String, pub bank_account: Option<String>, pub bank_name: Option<String> }

#[async_trait]
pub trait Store: Send + Sync {
    // catalog
    async fn insert_category(&self, category: &Category) -> Result<()>;
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn category_exists(&self, id: Uuid) -> Result<bool>;
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn list_products(&self, scope: ProductScope, page: Page) -> Result<Vec<Product>>;
    async fn set_product_approval(&self, id: Uuid, status: ApprovalStatus) -> Result<Option<Product>>;
    async fn update_product_prices(&self, id: Uuid, retail: Money, wholesale: Option<Money>) -> Result<Option<Product>>;
    /// Decrements stock by `qty` (and bumps sold count) only if at least `qty`
    /// is available and the product is orderable. `false` when nothing matched.
    async fn reserve_stock(&self, product_id: Uuid, qty: u32) -> Result<bool>;
    /// Exact inverse of a successful [`Store::reserve_stock`].
    async fn release_stock(&self, product_id: Uuid, qty: u32) -> Result<()>;

    // promo codes
    async fn insert_promo(&self, promo: &PromoCode) -> Result<()>;
    async fn find_promo(&self, code: &PromoKey) -> Result<Option<PromoCode>>;
    /// Increments usage only while the code is still valid at `now`.
    async fn increment_promo_usage(&self, code: &PromoKey, now: DateTime<Utc>) -> Result<bool>;
    async fn release_promo_usage(&self, code: &PromoKey) -> Result<()>;

    // orders
    async fn next_order_sequence(&self) -> Result<u64>;
    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn list_orders(&self, scope: OrderScope, page: Page) -> Result<Vec<Order>>;
    /// Compare-and-set on the statuses `change` was planned from. `None` when
    /// the order is missing or its statuses moved in the meantime.
    async fn update_order_status(&self, id: Uuid, change: &StatusChange, transaction_id: Option<&str>, now: DateTime<Utc>) -> Result<Option<Order>>;
    async fn set_payment_url(&self, id: Uuid, url: &str) -> Result<()>;
    /// [`Store::update_order_status`] for a change that reaches delivered, with
    /// the seller credits in the same transaction. Credits apply only while
    /// `settled_at` is unset; any failure leaves status and balances untouched.
    async fn deliver_order(&self, id: Uuid, change: &StatusChange, credits: &[(Uuid, Money)], now: DateTime<Utc>) -> Result<Option<Order>>;
    /// Compare-and-set to cancelled plus the stock return of every line, as
    /// one transaction. `None` when the statuses moved in the meantime.
    async fn cancel_order(&self, id: Uuid, change: &StatusChange, now: DateTime<Utc>) -> Result<Option<Order>>;

    // sellers and withdrawals
    async fn get_seller(&self, id: Uuid) -> Result<Option<SellerAccount>>;
    async fn upsert_seller_profile(&self, id: Uuid, profile: &SellerProfile, default_commission: rust_decimal::Decimal) -> Result<SellerAccount>;
    async fn pending_withdrawal_total(&self, seller_id: Uuid) -> Result<Money>;
    /// Inserts a pending withdrawal only if the seller balance still covers it
    /// on top of every other pending request. Checked under the seller row lock.
    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<()>;
    async fn get_withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>>;
    async fn list_withdrawals(&self, seller_id: Option<Uuid>, page: Page) -> Result<Vec<Withdrawal>>;
    /// Flips pending to approved and debits the seller balance, guarded by
    /// `balance >= amount`, as one write. Nothing changes on error.
    async fn approve_withdrawal(&self, id: Uuid, admin: Uuid, now: DateTime<Utc>) -> Result<Withdrawal>;
    async fn reject_withdrawal(&self, id: Uuid, admin: Uuid, reason: Option<&str>, now: DateTime<Utc>) -> Result<Withdrawal>;
    async fn complete_withdrawal(&self, id: Uuid, now: DateTime<Utc>) -> Result<Withdrawal>;
}
