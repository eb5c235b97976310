//! Order Aggregate
//!
//! Order status and payment status are two independent state machines. The
//! transition tables below are the only way statuses change; storage applies a
//! [`StatusChange`] with a compare-and-set on the statuses it was planned from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::OrderEvent;
use crate::domain::text_enum;
use crate::domain::value_objects::{Money, Phone, PromoKey};
use crate::MarketError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub order_number: String,
    pub items: Vec<LineItem>,
    pub customer: CustomerInfo,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub total_price: Money,
    pub shipping_price: Money,
    pub discount_amount: Money,
    pub promo_code: Option<PromoKey>,
    pub payment_url: Option<String>,
    pub payment_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Snapshot of a product at order time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl LineItem {
    pub fn new(product_id: Uuid, seller_id: Uuid, category_id: Option<Uuid>, name: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        Self { product_id, seller_id, category_id, name: name.into(), quantity, unit_price, line_total: unit_price.multiply(quantity) }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CustomerInfo { pub name: String, pub email: String, pub phone: Phone }

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ShippingAddress { pub region: String, pub city: String, pub address: String, pub postal_code: Option<String>, pub notes: Option<String> }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod { Click, Payme, Cash }

text_enum!(PaymentMethod { Click => "click", Payme => "payme", Cash => "cash" });

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled }

text_enum!(OrderStatus {
    Pending => "pending", Confirmed => "confirmed", Processing => "processing",
    Shipped => "shipped", Delivered => "delivered", Cancelled => "cancelled",
});

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

text_enum!(PaymentStatus { Pending => "pending", Paid => "paid", Failed => "failed", Refunded => "refunded" });

impl OrderStatus {
    fn fulfillment_step(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    /// Fulfillment only moves forward (steps may be skipped); cancellation is
    /// reachable from `Pending` alone; `Delivered` and `Cancelled` are final.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self.fulfillment_step(), next.fulfillment_step()) {
            (Some(0), None) => true,
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    pub fn is_final(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }
}

impl PaymentStatus {
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid) | (Self::Pending, Self::Failed) | (Self::Failed, Self::Paid) | (Self::Paid, Self::Refunded)
        )
    }
}

/// Target statuses for a single write. Built by [`Order::plan_status_change`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub from_order: OrderStatus,
    pub from_payment: PaymentStatus,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
}

impl StatusChange {
    pub fn is_noop(&self) -> bool { self.from_order == self.order_status && self.from_payment == self.payment_status }
    pub fn becomes_paid(&self) -> bool { self.from_payment != PaymentStatus::Paid && self.payment_status == PaymentStatus::Paid }
    pub fn becomes_delivered(&self) -> bool { self.from_order != OrderStatus::Delivered && self.order_status == OrderStatus::Delivered }
}

/// Validated checkout input, priced and ready to persist.
#[derive(Clone, Debug)]
pub struct OrderDraft {
    pub user_id: Option<Uuid>,
    pub items: Vec<LineItem>,
    pub customer: CustomerInfo,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub shipping_price: Money,
    pub discount_amount: Money,
    pub promo_code: Option<PromoKey>,
}

impl Order {
    pub fn place(order_number: String, draft: OrderDraft) -> Result<Self, OrderError> {
        if draft.items.is_empty() { return Err(OrderError::NoItems); }
        if draft.items.iter().any(|i| i.quantity == 0) { return Err(OrderError::InvalidQuantity); }
        let total_price = draft.items.iter().fold(Money::zero(), |acc, i| acc.add(i.line_total));
        if draft.discount_amount > total_price { return Err(OrderError::DiscountExceedsTotal); }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), user_id: draft.user_id, order_number, items: draft.items,
            customer: draft.customer, shipping_address: draft.shipping_address, payment_method: draft.payment_method,
            payment_status: PaymentStatus::Pending, order_status: OrderStatus::Pending,
            total_price, shipping_price: draft.shipping_price, discount_amount: draft.discount_amount,
            promo_code: draft.promo_code, payment_url: None, payment_transaction_id: None,
            created_at: now, updated_at: now, paid_at: None, delivered_at: None, cancelled_at: None, settled_at: None,
        })
    }

    /// What the customer pays: items plus shipping minus any promo discount.
    pub fn amount_due(&self) -> Money { self.total_price.add(self.shipping_price).saturating_sub(self.discount_amount) }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == Some(user_id) }
    pub fn involves_seller(&self, seller_id: Uuid) -> bool { self.items.iter().any(|i| i.seller_id == seller_id) }

    /// Validates requested statuses against both transition tables. Unset or
    /// unchanged axes keep their current value.
    pub fn plan_status_change(&self, order_status: Option<OrderStatus>, payment_status: Option<PaymentStatus>) -> Result<StatusChange, MarketError> {
        let next_order = order_status.unwrap_or(self.order_status);
        let next_payment = payment_status.unwrap_or(self.payment_status);
        if next_order != self.order_status && !self.order_status.can_transition_to(next_order) {
            return Err(MarketError::InvalidTransition { from: self.order_status.as_str(), to: next_order.as_str() });
        }
        if next_payment != self.payment_status && !self.payment_status.can_transition_to(next_payment) {
            return Err(MarketError::InvalidTransition { from: self.payment_status.as_str(), to: next_payment.as_str() });
        }
        Ok(StatusChange { from_order: self.order_status, from_payment: self.payment_status, order_status: next_order, payment_status: next_payment })
    }

    /// Applies a planned change. `paid_at` is stamped by the first transition to paid only.
    pub fn apply_status_change(&mut self, change: &StatusChange, now: DateTime<Utc>) {
        self.order_status = change.order_status;
        self.payment_status = change.payment_status;
        if change.payment_status == PaymentStatus::Paid && self.paid_at.is_none() { self.paid_at = Some(now); }
        if change.becomes_delivered() { self.delivered_at = Some(now); }
        if change.order_status == OrderStatus::Cancelled && self.cancelled_at.is_none() { self.cancelled_at = Some(now); }
        self.updated_at = now;
    }

    /// Total owed to each seller for this order, before commission.
    pub fn seller_totals(&self) -> Vec<(Uuid, Money)> {
        let mut totals: Vec<(Uuid, Money)> = Vec::new();
        for item in &self.items {
            match totals.iter_mut().find(|(seller, _)| *seller == item.seller_id) {
                Some((_, total)) => *total = total.add(item.line_total),
                None => totals.push((item.seller_id, item.line_total)),
            }
        }
        totals
    }

    pub fn to_event(&self) -> OrderEvent {
        OrderEvent {
            order_id: self.id, order_number: self.order_number.clone(),
            order_status: self.order_status.as_str(), payment_status: self.payment_status.as_str(),
            amount_due: self.amount_due(),
        }
    }
}

/// `ORD-YYYYMMDD-NNNNNN` from a monotonically increasing sequence value.
pub fn format_order_number(date: DateTime<Utc>, sequence: u64) -> String {
    format!("ORD-{}-{:06}", date.format("%Y%m%d"), sequence)
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NoItems, InvalidQuantity, DiscountExceedsTotal }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "Order has no items"),
            Self::InvalidQuantity => write!(f, "Quantity must be at least 1"),
            Self::DiscountExceedsTotal => write!(f, "Discount exceeds order total"),
        }
    }
}

impl From<OrderError> for MarketError {
    fn from(e: OrderError) -> Self { MarketError::Validation(e.to_string()) }
}

#[cfg(test)]
pub(crate) fn sample_draft(items: Vec<LineItem>) -> OrderDraft {
    OrderDraft {
        user_id: Some(Uuid::now_v7()), items,
        customer: CustomerInfo { name: "Aziz".into(), email: "aziz@example.uz".into(), phone: Phone::parse("+998901234567").unwrap() },
        shipping_address: ShippingAddress { region: "Toshkent".into(), city: "Toshkent".into(), address: "Amir Temur 1".into(), ..Default::default() },
        payment_method: PaymentMethod::Click, shipping_price: Money::zero(), discount_amount: Money::zero(), promo_code: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        let item = LineItem::new(Uuid::now_v7(), Uuid::now_v7(), None, "Rice", 3, Money::from_major(900));
        Order::place("ORD-20260101-000001".into(), sample_draft(vec![item])).unwrap()
    }

    #[test]
    fn test_total_is_sum_of_lines() {
        let seller = Uuid::now_v7();
        let items = vec![
            LineItem::new(Uuid::now_v7(), seller, None, "Rice", 3, Money::from_major(900)),
            LineItem::new(Uuid::now_v7(), seller, None, "Oil", 2, Money::from_major(150)),
        ];
        let o = Order::place("ORD-1".into(), sample_draft(items)).unwrap();
        assert_eq!(o.total_price, Money::from_major(3000));
        assert_eq!(o.seller_totals(), vec![(seller, Money::from_major(3000))]);
        assert_eq!((o.order_status, o.payment_status), (OrderStatus::Pending, PaymentStatus::Pending));
    }

    #[test]
    fn test_empty_order_rejected() {
        assert_eq!(Order::place("ORD-1".into(), sample_draft(vec![])).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_order_status_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Shipped));
        assert!(!Confirmed.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Shipped.can_transition_to(Processing));
        assert!(!Cancelled.can_transition_to(Confirmed));
    }

    #[test]
    fn test_payment_status_table() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Failed.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Refunded));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Refunded));
    }

    #[test]
    fn test_plan_rejects_backward_jump() {
        let mut o = order();
        let change = o.plan_status_change(Some(OrderStatus::Delivered), None).unwrap();
        o.apply_status_change(&change, Utc::now());
        assert!(o.delivered_at.is_some());
        let err = o.plan_status_change(Some(OrderStatus::Pending), None).unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { from: "delivered", to: "pending" }));
    }

    #[test]
    fn test_paid_at_set_once() {
        let mut o = order();
        let first = Utc::now() - chrono::Duration::minutes(5);
        let change = o.plan_status_change(None, Some(PaymentStatus::Paid)).unwrap();
        assert!(change.becomes_paid());
        o.apply_status_change(&change, first);
        assert_eq!(o.order_status, OrderStatus::Pending);
        let again = o.plan_status_change(None, Some(PaymentStatus::Paid)).unwrap();
        assert!(again.is_noop());
        o.apply_status_change(&again, Utc::now());
        assert_eq!(o.paid_at, Some(first));
    }

    #[test]
    fn test_order_number_format() {
        let date = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(format_order_number(date, 42), "ORD-20260309-000042");
    }
}
