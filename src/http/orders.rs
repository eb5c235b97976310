use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{created, ok, ApiResult, AppState, ListParams, MaybePrincipal, ValidJson};
use crate::auth::Principal;
use crate::domain::aggregates::{CustomerInfo, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress};
use crate::domain::value_objects::Phone;
use crate::services::{CartLine, Checkout};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    #[validate]
    pub customer: CustomerRequest,
    #[validate]
    pub shipping_address: AddressRequest,
    pub payment_method: PaymentMethod,
    pub promo_code: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OrderItemRequest { pub product_id: Uuid, pub quantity: u32 }

#[derive(Debug, Deserialize, Validate)]
pub struct CustomerRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Phone,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1))]
    pub region: String,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub address: String,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
}

pub async fn create_order(State(s): State<AppState>, MaybePrincipal(who): MaybePrincipal, ValidJson(r): ValidJson<CreateOrderRequest>) -> ApiResult<impl IntoResponse> {
    let checkout = Checkout {
        user_id: who.map(|p| p.id),
        items: r.items.into_iter().map(|i| CartLine { product_id: i.product_id, quantity: i.quantity }).collect(),
        customer: CustomerInfo { name: r.customer.name.trim().to_string(), email: r.customer.email, phone: r.customer.phone },
        shipping_address: ShippingAddress {
            region: r.shipping_address.region, city: r.shipping_address.city, address: r.shipping_address.address,
            postal_code: r.shipping_address.postal_code, notes: r.shipping_address.notes,
        },
        payment_method: r.payment_method,
        promo_code: r.promo_code.filter(|c| !c.trim().is_empty()),
    };
    Ok(created(s.services.orders.create_order(checkout).await?))
}

pub async fn list_orders(State(s): State<AppState>, who: Principal, Query(p): Query<ListParams>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.orders.list_orders(who, p.page()).await?))
}

pub async fn get_order(State(s): State<AppState>, who: Principal, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.orders.get_order(id, who).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest { pub order_status: Option<OrderStatus>, pub payment_status: Option<PaymentStatus> }

pub async fn update_status(State(s): State<AppState>, who: Principal, Path(id): Path<Uuid>, ValidJson(r): ValidJson<UpdateStatusRequest>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.orders.update_status(id, who, r.order_status, r.payment_status).await?))
}

pub async fn cancel_order(State(s): State<AppState>, who: Principal, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.orders.cancel_order(id, who).await?))
}
