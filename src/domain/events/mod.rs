//! Domain events
use crate::domain::value_objects::Money;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    NewOrder(OrderEvent),
    StatusChange(OrderEvent),
    Promotion(PromotionEvent),
    WithdrawalRequested(WithdrawalEvent),
    WithdrawalProcessed(WithdrawalEvent),
}

impl DomainEvent {
    /// Subject suffix used when publishing.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewOrder(_) => "new_order",
            Self::StatusChange(_) => "status_change",
            Self::Promotion(_) => "promotion",
            Self::WithdrawalRequested(_) => "withdrawal_requested",
            Self::WithdrawalProcessed(_) => "withdrawal_processed",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub order_number: String,
    pub order_status: &'static str,
    pub payment_status: &'static str,
    pub amount_due: Money,
}

#[derive(Clone, Debug, Serialize)]
pub struct PromotionEvent {
    pub code: String,
    pub discount_type: &'static str,
    pub discount_value: rust_decimal::Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct WithdrawalEvent {
    pub withdrawal_id: Uuid,
    pub seller_id: Uuid,
    pub amount: Money,
    pub status: &'static str,
}
