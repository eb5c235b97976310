//! JSON HTTP surface under `/api/v1`.
//!
//! Every response uses the same envelope: `{"success": true, "data": ...}` or
//! `{"success": false, "message": ...}`.

mod orders;
mod payments;
mod products;
mod promo;
mod sellers;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use crate::auth::{Principal, TokenVerifier};
use crate::services::Services;
use crate::store::Page;
use crate::MarketError;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub verifier: TokenVerifier,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/products", get(products::list_products).post(products::create_product))
        .route("/products/:id", get(products::get_product))
        .route("/products/:id/approval", put(products::set_approval))
        .route("/products/:id/prices", put(products::update_prices))
        .route("/categories", get(products::list_categories).post(products::create_category))
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order).delete(orders::cancel_order))
        .route("/orders/:id/status", put(orders::update_status))
        .route("/payments/:provider/init", post(payments::init_payment))
        .route("/payments/:provider/callback", post(payments::callback))
        .route("/promo-codes", post(promo::create_promo))
        .route("/promo-codes/validate", post(promo::validate))
        .route("/promo-codes/apply", post(promo::apply))
        .route("/sellers/me", get(sellers::me).put(sellers::update_profile))
        .route("/withdrawals", get(sellers::list_withdrawals).post(sellers::request_withdrawal))
        .route("/withdrawals/:id/approve", put(sellers::process_withdrawal))
        .route("/withdrawals/:id/complete", put(sellers::complete_withdrawal));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "optbozor-market"}))
}

#[derive(Serialize)]
pub struct Envelope<T> { success: bool, data: T }

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> { Json(Envelope { success: true, data }) }

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) { (StatusCode::CREATED, ok(data)) }

#[derive(Debug, Deserialize)]
pub struct ListParams { pub page: Option<u32>, pub per_page: Option<u32> }

impl ListParams {
    pub fn page(&self) -> Page { Page::new(self.page, self.per_page) }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub struct ApiError(pub MarketError);

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self { Self(e) }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

fn status_of(e: &MarketError) -> StatusCode {
    use MarketError::*;
    match e {
        Validation(_) | OutOfStock { .. } | InvalidTransition { .. } | InvalidState(_) | InsufficientBalance { .. }
        | BelowMinimum(_) | MissingBankInfo | PromoInvalid(_) | AlreadyProcessed => StatusCode::BAD_REQUEST,
        Conflict(_) => StatusCode::CONFLICT,
        ProductNotFound(_) | OrderNotFound(_) | PromoNotFound(_) | WithdrawalNotFound(_) | SellerNotFound(_) | CategoryNotFound(_) => StatusCode::NOT_FOUND,
        Forbidden => StatusCode::FORBIDDEN,
        Unauthorized => StatusCode::UNAUTHORIZED,
        Upstream(_) => StatusCode::BAD_GATEWAY,
        Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        let message = match &self.0 {
            MarketError::Storage(detail) => {
                tracing::error!(error = %detail, "storage failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({"success": false, "message": message}))).into_response()
    }
}

// =============================================================================
// Extractors
// =============================================================================

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()).ok_or(MarketError::Unauthorized)?;
        Ok(state.verifier.verify_header(header)?)
    }
}

/// Guest access: no `Authorization` header yields `None`, a bad token is still rejected.
pub struct MaybePrincipal(pub Option<Principal>);

#[async_trait]
impl FromRequestParts<AppState> for MaybePrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) { return Ok(Self(None)); }
        Principal::from_request_parts(parts, state).await.map(|p| Self(Some(p)))
    }
}

/// JSON body that must also pass its `validator` rules.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await
            .map_err(|rejection| MarketError::Validation(rejection.body_text()))?;
        value.validate().map_err(|e| MarketError::Validation(e.to_string()))?;
        Ok(Self(value))
    }
}
