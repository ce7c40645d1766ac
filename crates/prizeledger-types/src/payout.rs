//! Per-winner payout obligations.
//!
//! A COMPLETED [`PrizePayout`] references exactly one COMPLETED
//! PRIZE_PAYOUT ledger row whose amount equals the payout amount.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Currency, LedgerError, PaymentMethod, PayoutId, PrizePoolId, Result, TransactionId, UserId,
};

/// Where and how a winner wants to be paid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PayoutDetails {
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub note: Option<String>,
}

impl PayoutDetails {
    #[must_use]
    pub fn via(method: PaymentMethod, currency: Currency) -> Self {
        Self {
            method: Some(method),
            currency,
            note: None,
        }
    }

    pub fn require_method(&self) -> Result<PaymentMethod> {
        self.method.ok_or(LedgerError::MissingPayoutMethod)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Pending,
                Self::Processing | Self::Completed | Self::Failed | Self::Cancelled
            ) | (Self::Processing, Self::Completed | Self::Failed)
        )
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// One (prize pool, winner) obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizePayout {
    pub id: PayoutId,
    pub prize_pool_id: PrizePoolId,
    pub winner_id: UserId,
    pub position: u32,
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub payment_details: PayoutDetails,
    pub transaction_id: Option<TransactionId>,
    pub status: PayoutStatus,
    pub payout_date: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl PrizePayout {
    #[must_use]
    pub fn pending(
        prize_pool_id: PrizePoolId,
        winner_id: UserId,
        position: u32,
        amount: Decimal,
        payment_method: PaymentMethod,
        payment_details: PayoutDetails,
    ) -> Self {
        Self {
            id: PayoutId::new(),
            prize_pool_id,
            winner_id,
            position,
            amount,
            currency: payment_details.currency,
            payment_method,
            payment_details,
            transaction_id: None,
            status: PayoutStatus::Pending,
            payout_date: None,
            failure_reason: None,
        }
    }

    fn transition(&mut self, target: PayoutStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(LedgerError::InvalidPayoutTransition {
                id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    pub fn mark_processing(&mut self) -> Result<()> {
        self.transition(PayoutStatus::Processing)
    }

    pub fn complete(&mut self, transaction_id: TransactionId, at: DateTime<Utc>) -> Result<()> {
        self.transition(PayoutStatus::Completed)?;
        self.transaction_id = Some(transaction_id);
        self.payout_date = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, transaction_id: Option<TransactionId>, reason: impl Into<String>) -> Result<()> {
        self.transition(PayoutStatus::Failed)?;
        self.transaction_id = transaction_id;
        self.failure_reason = Some(reason.into());
        Ok(())
    }
}
