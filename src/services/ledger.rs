//! Seller ledger: settlement of delivered orders and withdrawal requests.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::{Principal, Role};
use crate::domain::aggregates::{Decision, Order, SellerAccount, Withdrawal};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Money;
use crate::notify::{self, Notifier};
use crate::store::{Page, SellerProfile, Store};
use crate::{MarketError, Result};

#[derive(Clone)]
pub struct SellerLedger {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    min_withdrawal: Money,
    default_commission: Decimal,
}

impl SellerLedger {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, min_withdrawal: Money, default_commission: Decimal) -> Self {
        Self { store, notifier, min_withdrawal, default_commission }
    }

    pub async fn seller(&self, id: Uuid) -> Result<SellerAccount> {
        self.store.get_seller(id).await?.ok_or(MarketError::SellerNotFound(id))
    }

    pub async fn upsert_profile(&self, principal: Principal, profile: SellerProfile) -> Result<SellerAccount> {
        principal.require(Role::Seller)?;
        if profile.name.trim().is_empty() { return Err(MarketError::Validation("name is required".into())); }
        self.store.upsert_seller_profile(principal.id, &profile, self.default_commission).await
    }

    /// What each seller in the order is owed once it is delivered: their
    /// lines net of commission. Applied by the store with the delivery itself.
    pub async fn settlement_credits(&self, order: &Order) -> Result<Vec<(Uuid, Money)>> {
        let mut credits = Vec::new();
        for (seller_id, gross) in order.seller_totals() {
            let seller = self.seller(seller_id).await?;
            credits.push((seller_id, seller.net_of_commission(gross)));
        }
        Ok(credits)
    }

    #[instrument(skip(self, notes))]
    pub async fn request_withdrawal(&self, seller_id: Uuid, amount: Money, notes: Option<String>) -> Result<Withdrawal> {
        if amount.is_zero() || amount.is_negative() { return Err(MarketError::Validation("amount must be positive".into())); }
        let seller = self.seller(seller_id).await?;
        let reserved = self.store.pending_withdrawal_total(seller_id).await?;
        let available = seller.balance.saturating_sub(reserved);
        if available < amount {
            return Err(MarketError::InsufficientBalance { requested: amount.amount(), available: available.amount() });
        }
        let withdrawal = Withdrawal::request(&seller, amount, notes)?;
        if amount < self.min_withdrawal { return Err(MarketError::BelowMinimum(self.min_withdrawal.amount())); }
        self.store.insert_withdrawal(&withdrawal).await?;
        tracing::info!(withdrawal = %withdrawal.id, %amount, "withdrawal requested");
        notify::dispatch(self.notifier.as_ref(), DomainEvent::WithdrawalRequested(withdrawal.to_event())).await;
        Ok(withdrawal)
    }

    #[instrument(skip(self, admin, reason))]
    pub async fn process_withdrawal(&self, id: Uuid, decision: Decision, admin: Principal, reason: Option<String>) -> Result<Withdrawal> {
        admin.require_admin()?;
        let now = Utc::now();
        let withdrawal = match decision {
            Decision::Approved => self.store.approve_withdrawal(id, admin.id, now).await?,
            Decision::Rejected => self.store.reject_withdrawal(id, admin.id, reason.as_deref(), now).await?,
        };
        tracing::info!(status = %withdrawal.status, amount = %withdrawal.amount, "withdrawal processed");
        notify::dispatch(self.notifier.as_ref(), DomainEvent::WithdrawalProcessed(withdrawal.to_event())).await;
        Ok(withdrawal)
    }

    pub async fn complete_withdrawal(&self, id: Uuid, admin: Principal) -> Result<Withdrawal> {
        admin.require_admin()?;
        let withdrawal = self.store.complete_withdrawal(id, Utc::now()).await?;
        tracing::info!(withdrawal = %id, "withdrawal completed");
        Ok(withdrawal)
    }

    pub async fn list_withdrawals(&self, principal: Principal, page: Page) -> Result<Vec<Withdrawal>> {
        match principal.role {
            Role::Admin => self.store.list_withdrawals(None, page).await,
            Role::Seller => self.store.list_withdrawals(Some(principal.id), page).await,
            Role::Customer => Err(MarketError::Forbidden),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::withdrawal::sample_seller;
    use crate::domain::aggregates::WithdrawalStatus;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::MemoryStore;

    fn admin() -> Principal { Principal { id: Uuid::now_v7(), role: Role::Admin } }

    async fn ledger_with(seller: SellerAccount) -> (SellerLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.put_seller(seller).await;
        let ledger = SellerLedger::new(store.clone(), Arc::new(RecordingNotifier::default()), Money::from_major(100_000), Decimal::from(10));
        (ledger, store)
    }

    #[tokio::test]
    async fn test_request_checks() {
        let seller = sample_seller(150_000);
        let (ledger, _) = ledger_with(seller.clone()).await;
        assert!(matches!(
            ledger.request_withdrawal(seller.id, Money::from_major(200_000), None).await,
            Err(MarketError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            ledger.request_withdrawal(seller.id, Money::from_major(50_000), None).await,
            Err(MarketError::BelowMinimum(_))
        ));
        assert!(matches!(ledger.request_withdrawal(seller.id, Money::zero(), None).await, Err(MarketError::Validation(_))));
        assert!(matches!(ledger.request_withdrawal(Uuid::now_v7(), Money::from_major(1), None).await, Err(MarketError::SellerNotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_requests_cannot_over_reserve() {
        let seller = sample_seller(250_000);
        let (ledger, store) = ledger_with(seller.clone()).await;
        let seller_id = seller.id;
        let handles: Vec<_> = (0..8).map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.request_withdrawal(seller_id, Money::from_major(150_000), None).await })
        }).collect();
        let mut accepted = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert!(matches!(e, MarketError::InsufficientBalance { .. })),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(store.pending_withdrawal_total(seller_id).await.unwrap(), Money::from_major(150_000));
    }

    #[tokio::test]
    async fn test_missing_bank_info() {
        let mut seller = sample_seller(500_000);
        seller.bank_account = None;
        let (ledger, _) = ledger_with(seller.clone()).await;
        assert!(matches!(ledger.request_withdrawal(seller.id, Money::from_major(100_000), None).await, Err(MarketError::MissingBankInfo)));
    }

    #[tokio::test]
    async fn test_pending_requests_reserve_balance() {
        let seller = sample_seller(250_000);
        let (ledger, _) = ledger_with(seller.clone()).await;
        ledger.request_withdrawal(seller.id, Money::from_major(150_000), None).await.unwrap();
        assert!(matches!(
            ledger.request_withdrawal(seller.id, Money::from_major(150_000), None).await,
            Err(MarketError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_approve_debits_once() {
        let seller = sample_seller(300_000);
        let (ledger, store) = ledger_with(seller.clone()).await;
        let w = ledger.request_withdrawal(seller.id, Money::from_major(120_000), Some("monthly".into())).await.unwrap();
        let id = w.id;
        let handles: Vec<_> = (0..8).map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.process_withdrawal(id, Decision::Approved, admin(), None).await })
        }).collect();
        let mut approved = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => approved += 1,
                Err(e) => assert!(matches!(e, MarketError::AlreadyProcessed)),
            }
        }
        assert_eq!(approved, 1);
        assert_eq!(store.get_seller(seller.id).await.unwrap().unwrap().balance, Money::from_major(180_000));
        let done = ledger.complete_withdrawal(w.id, admin()).await.unwrap();
        assert_eq!(done.status, WithdrawalStatus::Completed);
    }

    #[tokio::test]
    async fn test_approval_never_overdraws() {
        let seller = sample_seller(200_000);
        let (ledger, store) = ledger_with(seller.clone()).await;
        let w = ledger.request_withdrawal(seller.id, Money::from_major(200_000), None).await.unwrap();
        let mut drained = store.get_seller(seller.id).await.unwrap().unwrap();
        drained.balance = Money::from_major(50_000);
        store.put_seller(drained).await;
        assert!(matches!(
            ledger.process_withdrawal(w.id, Decision::Approved, admin(), None).await,
            Err(MarketError::InsufficientBalance { .. })
        ));
        let after = store.get_withdrawal(w.id).await.unwrap().unwrap();
        assert_eq!(after.status, WithdrawalStatus::Pending);
        assert_eq!(store.get_seller(seller.id).await.unwrap().unwrap().balance, Money::from_major(50_000));
    }

    #[tokio::test]
    async fn test_reject_keeps_balance() {
        let seller = sample_seller(300_000);
        let (ledger, store) = ledger_with(seller.clone()).await;
        let w = ledger.request_withdrawal(seller.id, Money::from_major(100_000), None).await.unwrap();
        let rejected = ledger.process_withdrawal(w.id, Decision::Rejected, admin(), Some("account closed".into())).await.unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("account closed"));
        assert_eq!(store.get_seller(seller.id).await.unwrap().unwrap().balance, Money::from_major(300_000));
        assert!(matches!(ledger.complete_withdrawal(w.id, admin()).await, Err(MarketError::InvalidState(_))));
        assert!(matches!(ledger.process_withdrawal(w.id, Decision::Approved, admin(), None).await, Err(MarketError::AlreadyProcessed)));
    }

    #[tokio::test]
    async fn test_only_admin_processes() {
        let seller = sample_seller(300_000);
        let (ledger, _) = ledger_with(seller.clone()).await;
        let w = ledger.request_withdrawal(seller.id, Money::from_major(100_000), None).await.unwrap();
        let as_seller = Principal { id: seller.id, role: Role::Seller };
        assert!(matches!(ledger.process_withdrawal(w.id, Decision::Approved, as_seller, None).await, Err(MarketError::Forbidden)));
        assert!(matches!(ledger.process_withdrawal(Uuid::now_v7(), Decision::Approved, admin(), None).await, Err(MarketError::WithdrawalNotFound(_))));
    }
}
