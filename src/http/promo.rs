use axum::extract::State;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{created, ok, ApiResult, AppState, ValidJson};
use crate::auth::Principal;
use crate::domain::aggregates::{DiscountType, NewPromoCode};
use crate::domain::value_objects::Money;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePromoRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_order_amount: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[validate(range(min = 1))]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub applicable_categories: Vec<Uuid>,
}

pub async fn create_promo(State(s): State<AppState>, who: Principal, ValidJson(r): ValidJson<CreatePromoRequest>) -> ApiResult<impl IntoResponse> {
    who.require_admin()?;
    let promo = s.services.pricing.create_promo(NewPromoCode {
        code: r.code, description: r.description, discount_type: r.discount_type, discount_value: r.discount_value,
        min_order_amount: Money::new(r.min_order_amount), valid_from: r.valid_from, valid_until: r.valid_until,
        max_uses: r.max_uses, applicable_categories: r.applicable_categories,
    }).await?;
    Ok(created(promo))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateRequest {
    #[validate(length(min = 1))]
    pub code: String,
    pub order_amount: Decimal,
}

pub async fn validate(State(s): State<AppState>, ValidJson(r): ValidJson<ValidateRequest>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.pricing.validate(&r.code, Money::new(r.order_amount)).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyRequest {
    #[validate(length(min = 1))]
    pub code: String,
    /// Order the code is being used for. `POST /orders` with `promo_code`
    /// already consumes it, so applying that order's code again is a no-op.
    pub order_id: Option<Uuid>,
}

pub async fn apply(State(s): State<AppState>, who: Principal, ValidJson(r): ValidJson<ApplyRequest>) -> ApiResult<impl IntoResponse> {
    let promo = match r.order_id {
        Some(id) => {
            let order = s.services.orders.get_order(id, who).await?;
            s.services.pricing.apply_to_order(&r.code, &order).await?
        }
        None => s.services.pricing.apply(&r.code).await?,
    };
    Ok(ok(promo))
}
