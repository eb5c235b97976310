//! PostgreSQL store. Counters and statuses change only through conditional
//! `UPDATE ... WHERE` statements or inside a transaction holding a row lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{OrderScope, Page, ProductScope, SellerProfile, Store};
use crate::domain::aggregates::{
    ApprovalStatus, Category, CustomerInfo, LineItem, Order, Product, PromoCode, SellerAccount, ShippingAddress, StatusChange, Withdrawal,
};
use crate::domain::value_objects::{Money, PromoKey};
use crate::{MarketError, Result};

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

fn count(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| MarketError::Storage(format!("{field} out of range: {value}")))
}

fn unique_violation(e: sqlx::Error, what: String) -> MarketError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => MarketError::Conflict(format!("{what} already exists")),
        _ => e.into(),
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow { id: Uuid, name: String, slug: String, description: Option<String>, parent_id: Option<Uuid>, created_at: DateTime<Utc> }

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category { id: r.id, name: r.name, slug: r.slug, description: r.description, parent_id: r.parent_id, created_at: r.created_at }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, seller_id: Uuid, category_id: Option<Uuid>, name: String, description: String,
    retail_price: Decimal, wholesale_price: Option<Decimal>, stock: i64, min_order_quantity: i64, unit: String,
    approval_status: String, is_active: bool, sold_count: i64, view_count: i64,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = MarketError;
    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: r.id, seller_id: r.seller_id, category_id: r.category_id, name: r.name, description: r.description,
            retail_price: Money::new(r.retail_price), wholesale_price: r.wholesale_price.map(Money::new),
            stock: count(r.stock, "stock")?, min_order_quantity: count(r.min_order_quantity, "min_order_quantity")?,
            unit: r.unit, approval_status: r.approval_status.parse()?, is_active: r.is_active,
            sold_count: count(r.sold_count, "sold_count")?, view_count: count(r.view_count, "view_count")?,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PromoRow {
    id: Uuid, code: String, description: Option<String>, discount_type: String, discount_value: Decimal,
    min_order_amount: Decimal, valid_from: DateTime<Utc>, valid_until: DateTime<Utc>, max_uses: Option<i64>,
    used_count: i64, applicable_categories: Vec<Uuid>, is_active: bool, created_at: DateTime<Utc>,
}

impl TryFrom<PromoRow> for PromoCode {
    type Error = MarketError;
    fn try_from(r: PromoRow) -> Result<Self> {
        Ok(PromoCode {
            id: r.id,
            code: PromoKey::new(&r.code).ok_or_else(|| MarketError::Storage(format!("malformed stored promo code '{}'", r.code)))?,
            description: r.description, discount_type: r.discount_type.parse()?, discount_value: r.discount_value,
            min_order_amount: Money::new(r.min_order_amount), valid_from: r.valid_from, valid_until: r.valid_until,
            max_uses: r.max_uses.map(|m| count(m, "max_uses")).transpose()?, used_count: count(r.used_count, "used_count")?,
            applicable_categories: r.applicable_categories, is_active: r.is_active, created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, user_id: Option<Uuid>, order_number: String, customer: Json<CustomerInfo>, shipping_address: Json<ShippingAddress>,
    payment_method: String, payment_status: String, order_status: String,
    total_price: Decimal, shipping_price: Decimal, discount_amount: Decimal, promo_code: Option<String>,
    payment_url: Option<String>, payment_transaction_id: Option<String>,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>, paid_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>, cancelled_at: Option<DateTime<Utc>>, settled_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: Uuid, product_id: Uuid, seller_id: Uuid, category_id: Option<Uuid>, name: String,
    quantity: i64, unit_price: Decimal, line_total: Decimal,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItemRow>) -> Result<Order> {
        let items = items.into_iter().map(|i| Ok(LineItem {
            product_id: i.product_id, seller_id: i.seller_id, category_id: i.category_id, name: i.name,
            quantity: count(i.quantity, "quantity")?, unit_price: Money::new(i.unit_price), line_total: Money::new(i.line_total),
        })).collect::<Result<Vec<_>>>()?;
        Ok(Order {
            id: self.id, user_id: self.user_id, order_number: self.order_number, items,
            customer: self.customer.0, shipping_address: self.shipping_address.0,
            payment_method: self.payment_method.parse()?, payment_status: self.payment_status.parse()?,
            order_status: self.order_status.parse()?, total_price: Money::new(self.total_price),
            shipping_price: Money::new(self.shipping_price), discount_amount: Money::new(self.discount_amount),
            promo_code: self.promo_code.as_deref().and_then(PromoKey::new),
            payment_url: self.payment_url, payment_transaction_id: self.payment_transaction_id,
            created_at: self.created_at, updated_at: self.updated_at, paid_at: self.paid_at,
            delivered_at: self.delivered_at, cancelled_at: self.cancelled_at, settled_at: self.settled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SellerRow {
    id: Uuid, name: String, balance: Decimal, commission_rate: Decimal, verification: String,
    bank_account: Option<String>, bank_name: Option<String>,
}

impl TryFrom<SellerRow> for SellerAccount {
    type Error = MarketError;
    fn try_from(r: SellerRow) -> Result<Self> {
        Ok(SellerAccount {
            id: r.id, name: r.name, balance: Money::new(r.balance), commission_rate: r.commission_rate,
            verification: r.verification.parse()?, bank_account: r.bank_account, bank_name: r.bank_name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WithdrawalRow {
    id: Uuid, seller_id: Uuid, amount: Decimal, status: String, bank_account: String, bank_name: String,
    notes: Option<String>, rejection_reason: Option<String>, processed_by: Option<Uuid>,
    processed_at: Option<DateTime<Utc>>, completed_at: Option<DateTime<Utc>>, created_at: DateTime<Utc>,
}

impl TryFrom<WithdrawalRow> for Withdrawal {
    type Error = MarketError;
    fn try_from(r: WithdrawalRow) -> Result<Self> {
        Ok(Withdrawal {
            id: r.id, seller_id: r.seller_id, amount: Money::new(r.amount), status: r.status.parse()?,
            bank_account: r.bank_account, bank_name: r.bank_name, notes: r.notes, rejection_reason: r.rejection_reason,
            processed_by: r.processed_by, processed_at: r.processed_at, completed_at: r.completed_at, created_at: r.created_at,
        })
    }
}

const RELEASE_STOCK: &str = "UPDATE products SET stock = stock + $2, sold_count = GREATEST(sold_count - $2, 0), updated_at = NOW() WHERE id = $1";

type OrderQuery<'q> = sqlx::query::QueryAs<'q, sqlx::Postgres, OrderRow, sqlx::postgres::PgArguments>;

/// Moves the order to `change`'s targets only while it still has the statuses
/// the change was planned from. `paid_at` keeps the first payment time.
fn status_cas<'q>(id: Uuid, change: &StatusChange, transaction_id: Option<&'q str>, now: DateTime<Utc>) -> OrderQuery<'q> {
    sqlx::query_as::<sqlx::Postgres, OrderRow>(
        "UPDATE orders SET order_status = $4, payment_status = $5, \
         paid_at = CASE WHEN $5 = 'paid' THEN COALESCE(paid_at, $6) ELSE paid_at END, \
         delivered_at = CASE WHEN $4 = 'delivered' THEN COALESCE(delivered_at, $6) ELSE delivered_at END, \
         cancelled_at = CASE WHEN $4 = 'cancelled' THEN COALESCE(cancelled_at, $6) ELSE cancelled_at END, \
         payment_transaction_id = COALESCE($7, payment_transaction_id), updated_at = $6 \
         WHERE id = $1 AND order_status = $2 AND payment_status = $3 RETURNING *")
        .bind(id).bind(change.from_order.as_str()).bind(change.from_payment.as_str())
        .bind(change.order_status.as_str()).bind(change.payment_status.as_str()).bind(now).bind(transaction_id)
}

const ITEMS_FOR: &str = "SELECT order_id, product_id, seller_id, category_id, name, quantity, unit_price, line_total \
                         FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position";

impl PgStore {
    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, OrderItemRow>(ITEMS_FOR).bind(&ids).fetch_all(&self.pool).await?;
        let mut by_order: HashMap<Uuid, Vec<OrderItemRow>> = HashMap::new();
        for item in items { by_order.entry(item.order_id).or_default().push(item); }
        rows.into_iter().map(|r| { let items = by_order.remove(&r.id).unwrap_or_default(); r.into_order(items) }).collect()
    }

    async fn withdrawal_exists(&self, id: Uuid) -> Result<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM withdrawals WHERE id = $1)").bind(id).fetch_one(&self.pool).await?)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_category(&self, c: &Category) -> Result<()> {
        sqlx::query("INSERT INTO categories (id, name, slug, description, parent_id, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(c.id).bind(&c.name).bind(&c.slug).bind(&c.description).bind(c.parent_id).bind(c.created_at)
            .execute(&self.pool).await.map_err(|e| unique_violation(e, format!("category '{}'", c.slug)))?;
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY name").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn category_exists(&self, id: Uuid) -> Result<bool> {
        Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1)").bind(id).fetch_one(&self.pool).await?)
    }

    async fn insert_product(&self, p: &Product) -> Result<()> {
        sqlx::query("INSERT INTO products (id, seller_id, category_id, name, description, retail_price, wholesale_price, stock, min_order_quantity, unit, approval_status, is_active, sold_count, view_count, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)")
            .bind(p.id).bind(p.seller_id).bind(p.category_id).bind(&p.name).bind(&p.description)
            .bind(p.retail_price.amount()).bind(p.wholesale_price.map(|w| w.amount()))
            .bind(i64::from(p.stock)).bind(i64::from(p.min_order_quantity)).bind(&p.unit)
            .bind(p.approval_status.as_str()).bind(p.is_active).bind(i64::from(p.sold_count)).bind(i64::from(p.view_count))
            .bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(Product::try_from).transpose()
    }

    async fn list_products(&self, scope: ProductScope, page: Page) -> Result<Vec<Product>> {
        let (storefront_only, seller) = match scope {
            ProductScope::All => (false, None),
            ProductScope::Storefront => (true, None),
            ProductScope::StorefrontAndSeller(seller) => (true, Some(seller)),
        };
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE ($1 = FALSE OR (approval_status = 'approved' AND is_active) OR seller_id = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4")
            .bind(storefront_only).bind(seller).bind(i64::from(page.limit)).bind(i64::from(page.offset))
            .fetch_all(&self.pool).await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn set_product_approval(&self, id: Uuid, status: ApprovalStatus) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("UPDATE products SET approval_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(status.as_str())
            .fetch_optional(&self.pool).await?.map(Product::try_from).transpose()
    }

    async fn update_product_prices(&self, id: Uuid, retail: Money, wholesale: Option<Money>) -> Result<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("UPDATE products SET retail_price = $2, wholesale_price = $3, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(retail.amount()).bind(wholesale.map(|w| w.amount()))
            .fetch_optional(&self.pool).await?.map(Product::try_from).transpose()
    }

    async fn reserve_stock(&self, product_id: Uuid, qty: u32) -> Result<bool> {
        let done = sqlx::query("UPDATE products SET stock = stock - $2, sold_count = sold_count + $2, updated_at = NOW() WHERE id = $1 AND stock >= $2 AND is_active AND approval_status = 'approved'")
            .bind(product_id).bind(i64::from(qty))
            .execute(&self.pool).await?;
        Ok(done.rows_affected() == 1)
    }

    async fn release_stock(&self, product_id: Uuid, qty: u32) -> Result<()> {
        let done = sqlx::query(RELEASE_STOCK).bind(product_id).bind(i64::from(qty))
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(MarketError::ProductNotFound(product_id)); }
        Ok(())
    }

    async fn insert_promo(&self, p: &PromoCode) -> Result<()> {
        sqlx::query("INSERT INTO promo_codes (id, code, description, discount_type, discount_value, min_order_amount, valid_from, valid_until, max_uses, used_count, applicable_categories, is_active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)")
            .bind(p.id).bind(p.code.as_str()).bind(&p.description).bind(p.discount_type.as_str()).bind(p.discount_value)
            .bind(p.min_order_amount.amount()).bind(p.valid_from).bind(p.valid_until).bind(p.max_uses.map(i64::from))
            .bind(i64::from(p.used_count)).bind(&p.applicable_categories).bind(p.is_active).bind(p.created_at)
            .execute(&self.pool).await.map_err(|e| unique_violation(e, format!("promo code {}", p.code)))?;
        Ok(())
    }

    async fn find_promo(&self, code: &PromoKey) -> Result<Option<PromoCode>> {
        sqlx::query_as::<_, PromoRow>("SELECT * FROM promo_codes WHERE code = $1").bind(code.as_str())
            .fetch_optional(&self.pool).await?.map(PromoCode::try_from).transpose()
    }

    async fn increment_promo_usage(&self, code: &PromoKey, now: DateTime<Utc>) -> Result<bool> {
        let done = sqlx::query("UPDATE promo_codes SET used_count = used_count + 1 WHERE code = $1 AND is_active AND valid_from <= $2 AND valid_until >= $2 AND (max_uses IS NULL OR used_count < max_uses)")
            .bind(code.as_str()).bind(now)
            .execute(&self.pool).await?;
        Ok(done.rows_affected() == 1)
    }

    async fn release_promo_usage(&self, code: &PromoKey) -> Result<()> {
        sqlx::query("UPDATE promo_codes SET used_count = GREATEST(used_count - 1, 0) WHERE code = $1")
            .bind(code.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    async fn next_order_sequence(&self) -> Result<u64> {
        let next = sqlx::query_scalar::<_, i64>("SELECT nextval('order_number_seq')").fetch_one(&self.pool).await?;
        u64::try_from(next).map_err(|_| MarketError::Storage(format!("order sequence out of range: {next}")))
    }

    async fn insert_order(&self, o: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO orders (id, user_id, order_number, customer, shipping_address, payment_method, payment_status, order_status, total_price, shipping_price, discount_amount, promo_code, payment_url, payment_transaction_id, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)")
            .bind(o.id).bind(o.user_id).bind(&o.order_number).bind(Json(&o.customer)).bind(Json(&o.shipping_address))
            .bind(o.payment_method.as_str()).bind(o.payment_status.as_str()).bind(o.order_status.as_str())
            .bind(o.total_price.amount()).bind(o.shipping_price.amount()).bind(o.discount_amount.amount())
            .bind(o.promo_code.as_ref().map(PromoKey::as_str)).bind(&o.payment_url).bind(&o.payment_transaction_id)
            .bind(o.created_at).bind(o.updated_at)
            .execute(&mut *tx).await.map_err(|e| unique_violation(e, format!("order {}", o.order_number)))?;
        for (position, item) in o.items.iter().enumerate() {
            sqlx::query("INSERT INTO order_items (order_id, position, product_id, seller_id, category_id, name, quantity, unit_price, line_total) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
                .bind(o.id).bind(position as i32).bind(item.product_id).bind(item.seller_id).bind(item.category_id)
                .bind(&item.name).bind(i64::from(item.quantity)).bind(item.unit_price.amount()).bind(item.line_total.amount())
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, scope: OrderScope, page: Page) -> Result<Vec<Order>> {
        let (filter, subject) = match scope {
            OrderScope::All => ("", None),
            OrderScope::Customer(user) => ("WHERE user_id = $3", Some(user)),
            OrderScope::Seller(seller) => ("WHERE id IN (SELECT order_id FROM order_items WHERE seller_id = $3)", Some(seller)),
        };
        let sql = format!("SELECT * FROM orders {filter} ORDER BY created_at DESC LIMIT $1 OFFSET $2");
        let mut query = sqlx::query_as::<_, OrderRow>(&sql).bind(i64::from(page.limit)).bind(i64::from(page.offset));
        if let Some(subject) = subject { query = query.bind(subject); }
        let rows = query.fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn update_order_status(&self, id: Uuid, change: &StatusChange, transaction_id: Option<&str>, now: DateTime<Utc>) -> Result<Option<Order>> {
        let row = status_cas(id, change, transaction_id, now).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn set_payment_url(&self, id: Uuid, url: &str) -> Result<()> {
        let done = sqlx::query("UPDATE orders SET payment_url = $2, updated_at = NOW() WHERE id = $1").bind(id).bind(url).execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(MarketError::OrderNotFound(id)); }
        Ok(())
    }

    async fn deliver_order(&self, id: Uuid, change: &StatusChange, credits: &[(Uuid, Money)], now: DateTime<Utc>) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await?;
        let Some(mut row) = status_cas(id, change, None, now).fetch_optional(&mut *tx).await? else { return Ok(None) };
        let marked = sqlx::query("UPDATE orders SET settled_at = $2 WHERE id = $1 AND settled_at IS NULL")
            .bind(id).bind(now).execute(&mut *tx).await?;
        if marked.rows_affected() == 1 {
            for (seller_id, amount) in credits {
                let credited = sqlx::query("UPDATE sellers SET balance = balance + $2 WHERE id = $1")
                    .bind(*seller_id).bind(amount.amount()).execute(&mut *tx).await?;
                if credited.rows_affected() == 0 { return Err(MarketError::SellerNotFound(*seller_id)); }
            }
        }
        tx.commit().await?;
        row.settled_at = row.settled_at.or(Some(now));
        Ok(self.hydrate(vec![row]).await?.pop())
    }

    async fn cancel_order(&self, id: Uuid, change: &StatusChange, now: DateTime<Utc>) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = status_cas(id, change, None, now).fetch_optional(&mut *tx).await? else { return Ok(None) };
        let items = sqlx::query_as::<_, OrderItemRow>(ITEMS_FOR).bind(vec![id]).fetch_all(&mut *tx).await?;
        for item in &items {
            let restored = sqlx::query(RELEASE_STOCK).bind(item.product_id).bind(item.quantity).execute(&mut *tx).await?;
            if restored.rows_affected() == 0 { return Err(MarketError::ProductNotFound(item.product_id)); }
        }
        tx.commit().await?;
        Ok(Some(row.into_order(items)?))
    }

    async fn get_seller(&self, id: Uuid) -> Result<Option<SellerAccount>> {
        sqlx::query_as::<_, SellerRow>("SELECT id, name, balance, commission_rate, verification, bank_account, bank_name FROM sellers WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?.map(SellerAccount::try_from).transpose()
    }

    async fn upsert_seller_profile(&self, id: Uuid, profile: &SellerProfile, default_commission: Decimal) -> Result<SellerAccount> {
        let row = sqlx::query_as::<_, SellerRow>(
            "INSERT INTO sellers (id, name, commission_rate, bank_account, bank_name) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, bank_account = EXCLUDED.bank_account, bank_name = EXCLUDED.bank_name \
             RETURNING id, name, balance, commission_rate, verification, bank_account, bank_name")
            .bind(id).bind(&profile.name).bind(default_commission).bind(&profile.bank_account).bind(&profile.bank_name)
            .fetch_one(&self.pool).await?;
        SellerAccount::try_from(row)
    }

    async fn pending_withdrawal_total(&self, seller_id: Uuid) -> Result<Money> {
        let total = sqlx::query_scalar::<_, Decimal>("SELECT COALESCE(SUM(amount), 0) FROM withdrawals WHERE seller_id = $1 AND status = 'pending'")
            .bind(seller_id).fetch_one(&self.pool).await?;
        Ok(Money::new(total))
    }

    async fn insert_withdrawal(&self, w: &Withdrawal) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let balance = sqlx::query_scalar::<_, Decimal>("SELECT balance FROM sellers WHERE id = $1 FOR UPDATE")
            .bind(w.seller_id).fetch_optional(&mut *tx).await?
            .ok_or(MarketError::SellerNotFound(w.seller_id))?;
        let reserved = sqlx::query_scalar::<_, Decimal>("SELECT COALESCE(SUM(amount), 0) FROM withdrawals WHERE seller_id = $1 AND status = 'pending'")
            .bind(w.seller_id).fetch_one(&mut *tx).await?;
        let available = (balance - reserved).max(Decimal::ZERO);
        if available < w.amount.amount() {
            return Err(MarketError::InsufficientBalance { requested: w.amount.amount(), available });
        }
        sqlx::query("INSERT INTO withdrawals (id, seller_id, amount, status, bank_account, bank_name, notes, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(w.id).bind(w.seller_id).bind(w.amount.amount()).bind(w.status.as_str())
            .bind(&w.bank_account).bind(&w.bank_name).bind(&w.notes).bind(w.created_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>> {
        sqlx::query_as::<_, WithdrawalRow>("SELECT * FROM withdrawals WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(Withdrawal::try_from).transpose()
    }

    async fn list_withdrawals(&self, seller_id: Option<Uuid>, page: Page) -> Result<Vec<Withdrawal>> {
        let rows = sqlx::query_as::<_, WithdrawalRow>("SELECT * FROM withdrawals WHERE ($1::uuid IS NULL OR seller_id = $1) ORDER BY created_at DESC LIMIT $2 OFFSET $3")
            .bind(seller_id).bind(i64::from(page.limit)).bind(i64::from(page.offset))
            .fetch_all(&self.pool).await?;
        rows.into_iter().map(Withdrawal::try_from).collect()
    }

    async fn approve_withdrawal(&self, id: Uuid, admin: Uuid, now: DateTime<Utc>) -> Result<Withdrawal> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, WithdrawalRow>("SELECT * FROM withdrawals WHERE id = $1 FOR UPDATE")
            .bind(id).fetch_optional(&mut *tx).await?
            .ok_or(MarketError::WithdrawalNotFound(id))?;
        if current.status != "pending" { return Err(MarketError::AlreadyProcessed); }
        let debited = sqlx::query_scalar::<_, Decimal>("UPDATE sellers SET balance = balance - $2 WHERE id = $1 AND balance >= $2 RETURNING balance")
            .bind(current.seller_id).bind(current.amount).fetch_optional(&mut *tx).await?;
        if debited.is_none() {
            let available = sqlx::query_scalar::<_, Decimal>("SELECT balance FROM sellers WHERE id = $1")
                .bind(current.seller_id).fetch_optional(&mut *tx).await?
                .ok_or(MarketError::SellerNotFound(current.seller_id))?;
            return Err(MarketError::InsufficientBalance { requested: current.amount, available });
        }
        let row = sqlx::query_as::<_, WithdrawalRow>("UPDATE withdrawals SET status = 'approved', processed_by = $2, processed_at = $3 WHERE id = $1 AND status = 'pending' RETURNING *")
            .bind(id).bind(admin).bind(now).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Withdrawal::try_from(row)
    }

    async fn reject_withdrawal(&self, id: Uuid, admin: Uuid, reason: Option<&str>, now: DateTime<Utc>) -> Result<Withdrawal> {
        let row = sqlx::query_as::<_, WithdrawalRow>("UPDATE withdrawals SET status = 'rejected', rejection_reason = $2, processed_by = $3, processed_at = $4 WHERE id = $1 AND status = 'pending' RETURNING *")
            .bind(id).bind(reason).bind(admin).bind(now).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Withdrawal::try_from(row),
            None if self.withdrawal_exists(id).await? => Err(MarketError::AlreadyProcessed),
            None => Err(MarketError::WithdrawalNotFound(id)),
        }
    }

    async fn complete_withdrawal(&self, id: Uuid, now: DateTime<Utc>) -> Result<Withdrawal> {
        let row = sqlx::query_as::<_, WithdrawalRow>("UPDATE withdrawals SET status = 'completed', completed_at = $2 WHERE id = $1 AND status = 'approved' RETURNING *")
            .bind(id).bind(now).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Withdrawal::try_from(row),
            None if self.withdrawal_exists(id).await? => Err(MarketError::InvalidState("Only approved withdrawals can be completed".into())),
            None => Err(MarketError::WithdrawalNotFound(id)),
        }
    }
}
