//! Payment gateway adapter for Click and Payme.
//!
//! Initiation builds the provider redirect URL. Callbacks drive the order's
//! payment status and may arrive more than once or race with admin updates.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::domain::aggregates::{Order, OrderStatus, PaymentMethod, PaymentStatus};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Money;
use crate::notify::{self, Notifier};
use crate::store::Store;
use crate::{MarketError, Result};

const CLICK_PAY_URL: &str = "https://my.click.uz/services/pay";
const PAYME_CHECKOUT_URL: &str = "https://checkout.paycom.uz";
const CALLBACK_ATTEMPTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus { Success, Failure }

#[derive(Clone, Debug, Serialize)]
pub struct PaymentInit {
    pub order_id: Uuid,
    pub provider: PaymentMethod,
    pub amount: Money,
    pub payment_url: String,
}

#[derive(Clone)]
pub struct PaymentGateway {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    config: PaymentConfig,
}

impl PaymentGateway {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: PaymentConfig) -> Self {
        Self { store, notifier, config }
    }

    pub fn click_url(&self, order_id: Uuid, amount: Money) -> String {
        format!(
            "{CLICK_PAY_URL}?service_id={}&merchant_id={}&amount={}&transaction_param={}&return_url={}",
            self.config.click_service_id,
            self.config.click_merchant_id,
            amount.amount().normalize(),
            order_id,
            urlencoding::encode(&self.config.return_url),
        )
    }

    /// Payme takes its parameters base64-encoded in the path; the amount is in tiyin.
    pub fn payme_url(&self, order_id: Uuid, amount: Money) -> String {
        let params = format!(
            "m={};ac.order_id={};a={};c={}",
            self.config.payme_merchant_id,
            order_id,
            amount.minor_units(),
            self.config.return_url,
        );
        format!("{PAYME_CHECKOUT_URL}/{}", STANDARD.encode(params))
    }

    #[instrument(skip(self))]
    pub async fn init_payment(&self, order_id: Uuid, amount: Money, method: PaymentMethod) -> Result<PaymentInit> {
        let order = self.store.get_order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
        if order.payment_status == PaymentStatus::Paid {
            return Err(MarketError::InvalidState(format!("order {} is already paid", order.order_number)));
        }
        if order.order_status == OrderStatus::Cancelled {
            return Err(MarketError::InvalidState(format!("order {} is cancelled", order.order_number)));
        }
        let due = order.amount_due();
        if amount != due {
            return Err(MarketError::Validation(format!("amount must equal the amount due ({due})")));
        }
        let payment_url = match method {
            PaymentMethod::Click => self.click_url(order_id, due),
            PaymentMethod::Payme => self.payme_url(order_id, due),
            PaymentMethod::Cash => return Err(MarketError::Validation("cash orders are paid on delivery".into())),
        };
        self.store.set_payment_url(order_id, &payment_url).await?;
        tracing::info!(order = %order.order_number, provider = %method, "payment initiated");
        Ok(PaymentInit { order_id, provider: method, amount: due, payment_url })
    }

    /// Checks the secret a callback presented against the configured one.
    pub fn authorize_callback(&self, presented: Option<&str>) -> Result<()> {
        match (self.config.callback_secret.as_deref(), presented) {
            (Some(expected), Some(given)) if expected == given => Ok(()),
            (None, _) => {
                tracing::warn!("payment callback refused: PAYMENT_CALLBACK_SECRET is not configured");
                Err(MarketError::Unauthorized)
            }
            _ => Err(MarketError::Unauthorized),
        }
    }

    /// Applies a provider callback. Returns the order as it stands afterwards.
    ///
    /// A paid order ignores further callbacks, so redelivered success
    /// notifications and late failures change nothing.
    #[instrument(skip(self))]
    pub async fn handle_callback(&self, order_id: Uuid, status: CallbackStatus, transaction_id: Option<String>) -> Result<Order> {
        for _ in 0..CALLBACK_ATTEMPTS {
            let order = self.store.get_order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
            if order.payment_status == PaymentStatus::Paid {
                tracing::debug!(order = %order.order_number, "callback for paid order ignored");
                return Ok(order);
            }
            let change = match status {
                CallbackStatus::Success => {
                    let next_order = (order.order_status == OrderStatus::Pending).then_some(OrderStatus::Confirmed);
                    order.plan_status_change(next_order, Some(PaymentStatus::Paid))?
                }
                CallbackStatus::Failure => order.plan_status_change(None, Some(PaymentStatus::Failed))?,
            };
            if change.is_noop() { return Ok(order); }
            if let Some(updated) = self.store.update_order_status(order_id, &change, transaction_id.as_deref(), Utc::now()).await? {
                tracing::info!(order = %updated.order_number, payment_status = %updated.payment_status, "payment callback applied");
                notify::dispatch(self.notifier.as_ref(), DomainEvent::StatusChange(updated.to_event())).await;
                return Ok(updated);
            }
            tracing::debug!(order = %order.order_number, "order changed during callback, retrying");
        }
        Err(MarketError::Conflict(format!("order {order_id} kept changing during payment callback")))
    }
}
