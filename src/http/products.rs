use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{created, ok, ApiResult, AppState, ListParams, MaybePrincipal, ValidJson};
use crate::auth::Principal;
use crate::domain::aggregates::ApprovalStatus;
use crate::domain::value_objects::Money;
use crate::services::ProductListing;

fn default_moq() -> u32 { 1 }
fn default_unit() -> String { "pcs".to_string() }

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 300))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Option<Uuid>,
    pub retail_price: Decimal,
    pub wholesale_price: Option<Decimal>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default = "default_moq")]
    #[validate(range(min = 1))]
    pub min_order_quantity: u32,
    #[serde(default = "default_unit")]
    #[validate(length(min = 1, max = 20))]
    pub unit: String,
}

pub async fn create_product(State(s): State<AppState>, who: Principal, ValidJson(r): ValidJson<CreateProductRequest>) -> ApiResult<impl IntoResponse> {
    let listing = ProductListing {
        category_id: r.category_id, name: r.name, description: r.description,
        retail_price: Money::new(r.retail_price), wholesale_price: r.wholesale_price.map(Money::new),
        stock: r.stock, min_order_quantity: r.min_order_quantity, unit: r.unit,
    };
    Ok(created(s.services.catalog.create_product(who, listing).await?))
}

pub async fn list_products(State(s): State<AppState>, MaybePrincipal(who): MaybePrincipal, Query(p): Query<ListParams>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.catalog.list_products(who, p.page()).await?))
}

pub async fn get_product(State(s): State<AppState>, MaybePrincipal(who): MaybePrincipal, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.catalog.get_product(id, who).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApprovalRequest { pub status: ApprovalStatus }

pub async fn set_approval(State(s): State<AppState>, who: Principal, Path(id): Path<Uuid>, ValidJson(r): ValidJson<ApprovalRequest>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.catalog.set_approval(id, r.status, who).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PricesRequest { pub retail_price: Decimal, pub wholesale_price: Option<Decimal> }

pub async fn update_prices(State(s): State<AppState>, who: Principal, Path(id): Path<Uuid>, ValidJson(r): ValidJson<PricesRequest>) -> ApiResult<impl IntoResponse> {
    let product = s.services.catalog.update_prices(id, who, Money::new(r.retail_price), r.wholesale_price.map(Money::new)).await?;
    Ok(ok(product))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

pub async fn list_categories(State(s): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.catalog.list_categories().await?))
}

pub async fn create_category(State(s): State<AppState>, who: Principal, ValidJson(r): ValidJson<CreateCategoryRequest>) -> ApiResult<impl IntoResponse> {
    Ok(created(s.services.catalog.create_category(who, &r.name, r.description, r.parent_id).await?))
}
