//! Withdrawal Aggregate and the seller account it draws from

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::WithdrawalEvent;
use crate::domain::text_enum;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Withdrawal {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub amount: Money,
    pub status: WithdrawalStatus,
    pub bank_account: String,
    pub bank_name: String,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus { #[default] Pending, Approved, Rejected, Completed }

text_enum!(WithdrawalStatus { Pending => "pending", Approved => "approved", Rejected => "rejected", Completed => "completed" });

/// Admin decision on a pending withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision { Approved, Rejected }

impl Withdrawal {
    pub fn request(seller: &SellerAccount, amount: Money, notes: Option<String>) -> Result<Self, WithdrawalError> {
        let (bank_account, bank_name) = seller.bank_info().ok_or(WithdrawalError::MissingBankInfo)?;
        Ok(Self {
            id: Uuid::now_v7(), seller_id: seller.id, amount, status: WithdrawalStatus::Pending,
            bank_account: bank_account.to_string(), bank_name: bank_name.to_string(), notes,
            rejection_reason: None, processed_by: None, processed_at: None, completed_at: None, created_at: Utc::now(),
        })
    }

    pub fn approve(&mut self, admin: Uuid, now: DateTime<Utc>) -> Result<(), WithdrawalError> {
        self.ensure_pending()?;
        self.status = WithdrawalStatus::Approved;
        self.processed_by = Some(admin);
        self.processed_at = Some(now);
        Ok(())
    }

    pub fn reject(&mut self, admin: Uuid, reason: Option<String>, now: DateTime<Utc>) -> Result<(), WithdrawalError> {
        self.ensure_pending()?;
        self.status = WithdrawalStatus::Rejected;
        self.rejection_reason = reason;
        self.processed_by = Some(admin);
        self.processed_at = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), WithdrawalError> {
        if self.status != WithdrawalStatus::Approved { return Err(WithdrawalError::NotApproved); }
        self.status = WithdrawalStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), WithdrawalError> {
        if self.status == WithdrawalStatus::Pending { Ok(()) } else { Err(WithdrawalError::AlreadyProcessed) }
    }

    pub fn to_event(&self) -> WithdrawalEvent {
        WithdrawalEvent { withdrawal_id: self.id, seller_id: self.seller_id, amount: self.amount, status: self.status.as_str() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SellerAccount {
    pub id: Uuid,
    pub name: String,
    pub balance: Money,
    /// Marketplace commission in percent of each settled sale.
    pub commission_rate: Decimal,
    pub verification: VerificationStatus,
    pub bank_account: Option<String>,
    pub bank_name: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus { #[default] Unverified, Pending, Verified }

text_enum!(VerificationStatus { Unverified => "unverified", Pending => "pending", Verified => "verified" });

impl SellerAccount {
    pub fn new(id: Uuid, name: impl Into<String>, commission_rate: Decimal) -> Self {
        Self { id, name: name.into(), balance: Money::zero(), commission_rate, verification: VerificationStatus::Unverified, bank_account: None, bank_name: None }
    }

    pub fn bank_info(&self) -> Option<(&str, &str)> {
        let account = self.bank_account.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let bank = self.bank_name.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((account, bank))
    }

    /// Share of a sale the seller keeps after commission.
    pub fn net_of_commission(&self, gross: Money) -> Money {
        let kept = Decimal::ONE_HUNDRED - self.commission_rate.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        gross.percentage(kept)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum WithdrawalError { MissingBankInfo, AlreadyProcessed, NotApproved }
impl std::error::Error for WithdrawalError {}
impl std::fmt::Display for WithdrawalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBankInfo => write!(f, "Bank account details are missing"),
            Self::AlreadyProcessed => write!(f, "Withdrawal has already been processed"),
            Self::NotApproved => write!(f, "Only approved withdrawals can be completed"),
        }
    }
}

impl From<WithdrawalError> for crate::MarketError {
    fn from(e: WithdrawalError) -> Self {
        match e {
            WithdrawalError::MissingBankInfo => crate::MarketError::MissingBankInfo,
            WithdrawalError::AlreadyProcessed => crate::MarketError::AlreadyProcessed,
            WithdrawalError::NotApproved => crate::MarketError::InvalidState(e.to_string()),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_seller(balance: i64) -> SellerAccount {
    let mut s = SellerAccount::new(Uuid::now_v7(), "Chorsu Savdo", Decimal::from(10));
    s.balance = Money::from_major(balance);
    s.bank_account = Some("20208000900123456001".into());
    s.bank_name = Some("Kapitalbank".into());
    s.verification = VerificationStatus::Verified;
    s
}
