//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::text_enum;
use crate::domain::value_objects::Money;
use crate::MarketError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub retail_price: Money,
    pub wholesale_price: Option<Money>,
    pub stock: u32,
    pub min_order_quantity: u32,
    pub unit: String,
    pub approval_status: ApprovalStatus,
    pub is_active: bool,
    pub sold_count: u32,
    pub view_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus { #[default] Pending, Approved, Rejected }

text_enum!(ApprovalStatus { Pending => "pending", Approved => "approved", Rejected => "rejected" });

/// Seller-supplied fields for a new listing.
#[derive(Clone, Debug)]
pub struct NewProduct {
    pub seller_id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub retail_price: Money,
    pub wholesale_price: Option<Money>,
    pub stock: u32,
    pub min_order_quantity: u32,
    pub unit: String,
}

impl Product {
    /// New listings await admin approval before they can be ordered.
    pub fn create(new: NewProduct) -> Result<Self, ProductError> {
        if new.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if new.retail_price.is_zero() || new.retail_price.is_negative() { return Err(ProductError::InvalidPrice); }
        if let Some(wholesale) = new.wholesale_price {
            if wholesale.is_negative() || wholesale > new.retail_price { return Err(ProductError::WholesaleAboveRetail); }
        }
        if new.min_order_quantity == 0 { return Err(ProductError::InvalidMinimumQuantity); }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), seller_id: new.seller_id, category_id: new.category_id,
            name: new.name.trim().to_string(), description: new.description, retail_price: new.retail_price,
            wholesale_price: new.wholesale_price, stock: new.stock, min_order_quantity: new.min_order_quantity,
            unit: new.unit, approval_status: ApprovalStatus::Pending, is_active: true,
            sold_count: 0, view_count: 0, created_at: now, updated_at: now,
        })
    }

    /// Wholesale price when the seller set one, retail otherwise.
    pub fn unit_price(&self) -> Money { self.wholesale_price.unwrap_or(self.retail_price) }

    pub fn is_orderable(&self) -> bool { self.is_active && self.approval_status == ApprovalStatus::Approved }
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }

    /// Checks everything about a requested quantity that can be known from a
    /// snapshot. The stock check is repeated atomically when the stock is reserved.
    pub fn check_order_quantity(&self, quantity: u32) -> Result<(), MarketError> {
        if !self.is_orderable() {
            return Err(MarketError::Validation(format!("{} is not available for ordering", self.name)));
        }
        if quantity < self.min_order_quantity {
            return Err(MarketError::Validation(format!(
                "minimum order quantity for {} is {} {}", self.name, self.min_order_quantity, self.unit
            )));
        }
        if self.stock < quantity {
            return Err(MarketError::OutOfStock { product: self.name.clone(), requested: quantity, available: self.stock });
        }
        Ok(())
    }

    pub fn set_approval(&mut self, status: ApprovalStatus) {
        self.approval_status = status;
        self.touch();
    }

    pub fn remove_stock(&mut self, qty: u32) -> Result<(), ProductError> {
        self.stock = self.stock.checked_sub(qty).ok_or(ProductError::InsufficientStock)?;
        self.sold_count = self.sold_count.saturating_add(qty);
        self.touch();
        Ok(())
    }

    pub fn restore_stock(&mut self, qty: u32) {
        self.stock = self.stock.saturating_add(qty);
        self.sold_count = self.sold_count.saturating_sub(qty);
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn create(name: &str, description: Option<String>, parent_id: Option<Uuid>) -> Result<Self, ProductError> {
        let name = name.trim();
        if name.is_empty() { return Err(ProductError::MissingName); }
        Ok(Self { id: Uuid::now_v7(), name: name.to_string(), slug: slugify(name), description, parent_id, created_at: Utc::now() })
    }
}

fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError { MissingName, InvalidPrice, WholesaleAboveRetail, InvalidMinimumQuantity, InsufficientStock }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "Missing name"),
            Self::InvalidPrice => write!(f, "Retail price must be positive"),
            Self::WholesaleAboveRetail => write!(f, "Wholesale price must not exceed retail price"),
            Self::InvalidMinimumQuantity => write!(f, "Minimum order quantity must be at least 1"),
            Self::InsufficientStock => write!(f, "Insufficient stock"),
        }
    }
}

impl From<ProductError> for MarketError {
    fn from(e: ProductError) -> Self { MarketError::Validation(e.to_string()) }
}

#[cfg(test)]
pub(crate) fn sample(stock: u32, retail: i64, wholesale: Option<i64>) -> Product {
    let mut p = Product::create(NewProduct {
        seller_id: Uuid::now_v7(), category_id: None, name: "Rice 25kg".into(), description: String::new(),
        retail_price: Money::from_major(retail), wholesale_price: wholesale.map(Money::from_major),
        stock, min_order_quantity: 1, unit: "bag".into(),
    }).unwrap();
    p.set_approval(ApprovalStatus::Approved);
    p
}
