use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{ok, ApiResult, AppState, ValidJson};
use crate::domain::aggregates::PaymentMethod;
use crate::domain::value_objects::Money;
use crate::services::CallbackStatus;

#[derive(Debug, Deserialize, Validate)]
pub struct InitPaymentRequest { pub order_id: Uuid, pub amount: Decimal }

pub async fn init_payment(State(s): State<AppState>, Path(provider): Path<String>, ValidJson(r): ValidJson<InitPaymentRequest>) -> ApiResult<impl IntoResponse> {
    let method: PaymentMethod = provider.parse()?;
    Ok(ok(s.services.payments.init_payment(r.order_id, Money::new(r.amount), method).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CallbackRequest {
    pub order_id: Uuid,
    pub status: CallbackStatus,
    #[validate(length(min = 1, max = 128))]
    pub transaction_id: Option<String>,
}

pub const CALLBACK_SECRET_HEADER: &str = "x-callback-secret";

pub async fn callback(State(s): State<AppState>, Path(provider): Path<String>, headers: HeaderMap, ValidJson(r): ValidJson<CallbackRequest>) -> ApiResult<impl IntoResponse> {
    let method: PaymentMethod = provider.parse()?;
    s.services.payments.authorize_callback(headers.get(CALLBACK_SECRET_HEADER).and_then(|v| v.to_str().ok()))?;
    tracing::info!(provider = %method, order = %r.order_id, status = ?r.status, "payment callback received");
    Ok(ok(s.services.payments.handle_callback(r.order_id, r.status, r.transaction_id).await?))
}
