//! Product and category catalog.

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::auth::{Principal, Role};
use crate::domain::aggregates::{ApprovalStatus, Category, NewProduct, Product};
use crate::domain::value_objects::Money;
use crate::store::{Page, ProductScope, Store};
use crate::{MarketError, Result};

/// Listing fields a seller submits. The seller is the caller.
#[derive(Clone, Debug)]
pub struct ProductListing {
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub retail_price: Money,
    pub wholesale_price: Option<Money>,
    pub stock: u32,
    pub min_order_quantity: u32,
    pub unit: String,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    #[instrument(skip(self, principal, listing), fields(seller = %principal.id))]
    pub async fn create_product(&self, principal: Principal, listing: ProductListing) -> Result<Product> {
        principal.require(Role::Seller)?;
        if self.store.get_seller(principal.id).await?.is_none() {
            return Err(MarketError::SellerNotFound(principal.id));
        }
        if let Some(category) = listing.category_id {
            if !self.store.category_exists(category).await? { return Err(MarketError::CategoryNotFound(category)); }
        }
        let product = Product::create(NewProduct {
            seller_id: principal.id, category_id: listing.category_id, name: listing.name, description: listing.description,
            retail_price: listing.retail_price, wholesale_price: listing.wholesale_price, stock: listing.stock,
            min_order_quantity: listing.min_order_quantity, unit: listing.unit,
        })?;
        self.store.insert_product(&product).await?;
        tracing::info!(product = %product.id, "product submitted for approval");
        Ok(product)
    }

    /// Customers and guests see approved, active listings only. Sellers also
    /// see their own pending and rejected listings; admins see everything.
    pub async fn list_products(&self, principal: Option<Principal>, page: Page) -> Result<Vec<Product>> {
        let scope = match principal {
            Some(p) if p.is_admin() => ProductScope::All,
            Some(p) if p.role == Role::Seller => ProductScope::StorefrontAndSeller(p.id),
            _ => ProductScope::Storefront,
        };
        self.store.list_products(scope, page).await
    }

    pub async fn get_product(&self, id: Uuid, principal: Option<Principal>) -> Result<Product> {
        let product = self.store.get_product(id).await?.ok_or(MarketError::ProductNotFound(id))?;
        let privileged = principal.is_some_and(|p| p.is_admin() || p.id == product.seller_id);
        if !product.is_orderable() && !privileged { return Err(MarketError::ProductNotFound(id)); }
        Ok(product)
    }

    pub async fn set_approval(&self, id: Uuid, status: ApprovalStatus, admin: Principal) -> Result<Product> {
        admin.require_admin()?;
        let product = self.store.set_product_approval(id, status).await?.ok_or(MarketError::ProductNotFound(id))?;
        tracing::info!(product = %id, status = %status, "product approval changed");
        Ok(product)
    }

    /// New prices apply to future orders only; placed orders keep their snapshot.
    pub async fn update_prices(&self, id: Uuid, principal: Principal, retail: Money, wholesale: Option<Money>) -> Result<Product> {
        let product = self.store.get_product(id).await?.ok_or(MarketError::ProductNotFound(id))?;
        if !(principal.is_admin() || principal.id == product.seller_id) { return Err(MarketError::Forbidden); }
        if retail.is_zero() || retail.is_negative() { return Err(MarketError::Validation("retail price must be positive".into())); }
        if wholesale.is_some_and(|w| w.is_negative() || w > retail) {
            return Err(MarketError::Validation("wholesale price must not exceed retail price".into()));
        }
        self.store.update_product_prices(id, retail, wholesale).await?.ok_or(MarketError::ProductNotFound(id))
    }

    pub async fn create_category(&self, admin: Principal, name: &str, description: Option<String>, parent_id: Option<Uuid>) -> Result<Category> {
        admin.require_admin()?;
        if let Some(parent) = parent_id {
            if !self.store.category_exists(parent).await? { return Err(MarketError::CategoryNotFound(parent)); }
        }
        let category = Category::create(name, description, parent_id)?;
        self.store.insert_category(&category).await?;
        Ok(category)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> { self.store.list_categories().await }
}
