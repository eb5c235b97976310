//! Seller profile and withdrawal endpoints.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{created, ok, ApiResult, AppState, ListParams, ValidJson};
use crate::auth::{Principal, Role};
use crate::domain::aggregates::Decision;
use crate::domain::value_objects::Money;
use crate::store::SellerProfile;

pub async fn me(State(s): State<AppState>, who: Principal) -> ApiResult<impl IntoResponse> {
    who.require(Role::Seller)?;
    Ok(ok(s.services.ledger.seller(who.id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 16, max = 32))]
    pub bank_account: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub bank_name: Option<String>,
}

pub async fn update_profile(State(s): State<AppState>, who: Principal, ValidJson(r): ValidJson<ProfileRequest>) -> ApiResult<impl IntoResponse> {
    let profile = SellerProfile { name: r.name, bank_account: r.bank_account, bank_name: r.bank_name };
    Ok(ok(s.services.ledger.upsert_profile(who, profile).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

pub async fn request_withdrawal(State(s): State<AppState>, who: Principal, ValidJson(r): ValidJson<WithdrawalRequest>) -> ApiResult<impl IntoResponse> {
    who.require(Role::Seller)?;
    Ok(created(s.services.ledger.request_withdrawal(who.id, Money::new(r.amount), r.notes).await?))
}

pub async fn list_withdrawals(State(s): State<AppState>, who: Principal, Query(p): Query<ListParams>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.ledger.list_withdrawals(who, p.page()).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct DecisionRequest {
    pub status: Decision,
    #[validate(length(max = 500))]
    pub rejection_reason: Option<String>,
}

pub async fn process_withdrawal(State(s): State<AppState>, who: Principal, Path(id): Path<Uuid>, ValidJson(r): ValidJson<DecisionRequest>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.ledger.process_withdrawal(id, r.status, who, r.rejection_reason).await?))
}

pub async fn complete_withdrawal(State(s): State<AppState>, who: Principal, Path(id): Path<Uuid>) -> ApiResult<impl IntoResponse> {
    Ok(ok(s.services.ledger.complete_withdrawal(id, who).await?))
}
