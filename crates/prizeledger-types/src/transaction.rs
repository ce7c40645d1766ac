//! Ledger rows.
//!
//! A [`FinancialTransaction`] records exactly one money movement. Rows are
//! append-only: after COMPLETED the only permitted change is the single
//! COMPLETED → REFUNDED status flip, and amount / fee / net are frozen from
//! the moment the row is first written.
//!
//! ## State Machine
//!
//! ```text
//!   PENDING ──▶ PROCESSING ──▶ COMPLETED ──▶ REFUNDED
//!      │             │
//!      │             └───────▶ FAILED
//!      ├──────────────────────▶ COMPLETED | FAILED
//!      └──────────────────────▶ CANCELLED
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{MIN_TRANSACTION_AMOUNT, MONEY_SCALE};
use crate::money::round_cents;
use crate::{
    Currency, EscrowAccountId, LedgerError, PaymentAccountId, PaymentMethod, PrizePoolId, Result,
    SponsorId, TournamentId, TransactionId, UserId,
};

/// Kind of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    EntryFee,
    PrizePayout,
    SponsorshipPayment,
    Refund,
    PlatformFee,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EntryFee => "ENTRY_FEE",
            Self::PrizePayout => "PRIZE_PAYOUT",
            Self::SponsorshipPayment => "SPONSORSHIP_PAYMENT",
            Self::Refund => "REFUND",
            Self::PlatformFee => "PLATFORM_FEE",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl TransactionStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending | Self::Processing, Self::Failed)
                | (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Completed, Self::Refunded)
        )
    }

    /// `target` is reachable in one or more steps. A single unit of work
    /// may pass through PROCESSING without committing it.
    #[must_use]
    pub fn can_reach(self, target: Self) -> bool {
        self.can_transition_to(target)
            || (self.can_transition_to(Self::Processing)
                && Self::Processing.can_transition_to(target))
    }

    /// Still awaiting an outcome from the processor.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// No further transition except possibly a refund.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled | Self::Refunded)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Refunded => "REFUNDED",
        };
        f.write_str(name)
    }
}

/// Per-type payload of a ledger row. The variant determines the
/// [`TransactionType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionMetadata {
    EntryFee {
        tournament_id: TournamentId,
        payment_method: PaymentMethod,
    },
    PrizePayout {
        tournament_id: TournamentId,
        escrow_account_id: EscrowAccountId,
        payment_account_id: PaymentAccountId,
        position: Option<u32>,
    },
    SponsorshipPayment {
        prize_pool_id: PrizePoolId,
        sponsor_id: SponsorId,
    },
    Refund {
        original_transaction_id: TransactionId,
        reason: String,
    },
    PlatformFee {
        source_transaction_id: TransactionId,
    },
}

impl TransactionMetadata {
    #[must_use]
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::EntryFee { .. } => TransactionType::EntryFee,
            Self::PrizePayout { .. } => TransactionType::PrizePayout,
            Self::SponsorshipPayment { .. } => TransactionType::SponsorshipPayment,
            Self::Refund { .. } => TransactionType::Refund,
            Self::PlatformFee { .. } => TransactionType::PlatformFee,
        }
    }

    /// Tournament the movement belongs to, where the payload names one.
    #[must_use]
    pub fn tournament_id(&self) -> Option<TournamentId> {
        match self {
            Self::EntryFee { tournament_id, .. } | Self::PrizePayout { tournament_id, .. } => {
                Some(*tournament_id)
            }
            _ => None,
        }
    }
}

/// One immutable record of a money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialTransaction {
    pub id: TransactionId,
    pub from_user_id: Option<UserId>,
    pub to_user_id: Option<UserId>,
    pub amount: Decimal,
    pub currency: Currency,
    pub platform_fee: Decimal,
    pub net_amount: Decimal,
    /// Name of the adapter that moved the money.
    pub payment_processor: String,
    pub external_transaction_id: Option<String>,
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    pub metadata: TransactionMetadata,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub escrow_release_date: Option<DateTime<Utc>>,
}

impl FinancialTransaction {
    /// Build a PENDING row. `net_amount` is derived as `amount - platform_fee`.
    #[must_use]
    pub fn pending(
        metadata: TransactionMetadata,
        from_user_id: Option<UserId>,
        to_user_id: Option<UserId>,
        amount: Decimal,
        currency: Currency,
        platform_fee: Decimal,
        payment_processor: impl Into<String>,
    ) -> Self {
        let amount = round_cents(amount);
        let platform_fee = round_cents(platform_fee);
        Self {
            id: TransactionId::new(),
            from_user_id,
            to_user_id,
            amount,
            currency,
            platform_fee,
            net_amount: round_cents(amount - platform_fee),
            payment_processor: payment_processor.into(),
            external_transaction_id: None,
            status: TransactionStatus::Pending,
            failure_reason: None,
            metadata,
            created_at: Utc::now(),
            processed_at: None,
            escrow_release_date: None,
        }
    }

    #[must_use]
    pub fn transaction_type(&self) -> TransactionType {
        self.metadata.transaction_type()
    }

    /// Move to `target`, enforcing the status machine.
    pub fn transition(&mut self, target: TransactionStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(LedgerError::InvalidTransactionTransition {
                id: self.id,
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    pub fn mark_processing(&mut self) -> Result<()> {
        self.transition(TransactionStatus::Processing)
    }

    pub fn complete(&mut self, external_transaction_id: String, at: DateTime<Utc>) -> Result<()> {
        self.transition(TransactionStatus::Completed)?;
        self.external_transaction_id = Some(external_transaction_id);
        self.processed_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        self.transition(TransactionStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        self.processed_at = Some(at);
        Ok(())
    }

    pub fn mark_refunded(&mut self) -> Result<()> {
        self.transition(TransactionStatus::Refunded)
    }

    /// Field-level invariants checked before every commit.
    pub fn check_invariants(&self) -> Result<()> {
        let violation =
            |reason: String| -> Result<()> { Err(LedgerError::InvariantViolation { reason }) };

        if self.amount < MIN_TRANSACTION_AMOUNT {
            return violation(format!(
                "{}: amount {} below minimum {MIN_TRANSACTION_AMOUNT}",
                self.id, self.amount
            ));
        }
        if self.platform_fee < Decimal::ZERO {
            return violation(format!("{}: negative platform fee", self.id));
        }
        for (field, value) in [
            ("amount", self.amount),
            ("platform_fee", self.platform_fee),
            ("net_amount", self.net_amount),
        ] {
            if value.normalize().scale() > MONEY_SCALE {
                return violation(format!("{}: {field} {value} is not cent-precise", self.id));
            }
        }
        if self.net_amount != self.amount - self.platform_fee {
            return violation(format!(
                "{}: net {} != amount {} - fee {}",
                self.id, self.net_amount, self.amount, self.platform_fee
            ));
        }
        if self.net_amount < Decimal::ZERO {
            return violation(format!("{}: negative net amount", self.id));
        }
        Ok(())
    }

    /// Compare against the committed version of the same row; only the
    /// status-outcome fields may differ, and only along the status machine.
    pub fn check_update_from(&self, committed: &Self) -> Result<()> {
        let frozen: [(&'static str, bool); 7] = [
            ("amount", self.amount == committed.amount),
            ("platform_fee", self.platform_fee == committed.platform_fee),
            ("net_amount", self.net_amount == committed.net_amount),
            ("currency", self.currency == committed.currency),
            ("from_user_id", self.from_user_id == committed.from_user_id),
            ("to_user_id", self.to_user_id == committed.to_user_id),
            ("metadata", self.metadata == committed.metadata),
        ];
        if let Some((field, _)) = frozen.iter().find(|(_, same)| !same) {
            return Err(LedgerError::ImmutableFieldChanged { id: self.id, field });
        }
        if self.status != committed.status && !committed.status.can_reach(self.status) {
            return Err(LedgerError::InvalidTransactionTransition {
                id: self.id,
                from: committed.status,
                to: self.status,
            });
        }
        if committed.status == TransactionStatus::Completed
            && self.status == TransactionStatus::Completed
            && self != committed
        {
            return Err(LedgerError::ImmutableFieldChanged {
                id: self.id,
                field: "completed row",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry_fee_row(amount: Decimal, fee: Decimal) -> FinancialTransaction {
        FinancialTransaction::pending(
            TransactionMetadata::EntryFee {
                tournament_id: TournamentId::new(),
                payment_method: PaymentMethod::Stripe,
            },
            Some(UserId::new()),
            None,
            amount,
            Currency::Usd,
            fee,
            "stripe",
        )
    }

    #[test]
    fn pending_derives_net_amount() {
        let tx = entry_fee_row(dec!(25.00), dec!(1.25));
        assert_eq!(tx.net_amount, dec!(23.75));
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.transaction_type(), TransactionType::EntryFee);
        tx.check_invariants().unwrap();
    }

    #[test]
    fn status_machine() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Refunded));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Refunded.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Cancelled));
    }

    #[test]
    fn one_unit_may_pass_through_processing() {
        use TransactionStatus::*;
        assert!(Pending.can_reach(Completed));
        assert!(Pending.can_reach(Failed));
        assert!(!Pending.can_reach(Cancelled));
        assert!(!Pending.can_reach(Refunded));
        assert!(!Failed.can_reach(Completed));
    }

    #[test]
    fn pending_row_cannot_skip_processing() {
        let mut tx = entry_fee_row(dec!(10.00), dec!(0.50));
        let err = tx.complete("ext_1".into(), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransactionTransition { .. }
        ));
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[test]
    fn complete_then_refund() {
        let mut tx = entry_fee_row(dec!(10.00), dec!(0.50));
        tx.mark_processing().unwrap();
        tx.complete("ext_1".into(), Utc::now()).unwrap();
        assert_eq!(tx.external_transaction_id.as_deref(), Some("ext_1"));
        assert!(tx.processed_at.is_some());
        tx.mark_refunded().unwrap();
        let err = tx.mark_refunded().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransactionTransition { .. }
        ));
    }

    #[test]
    fn failed_row_keeps_reason() {
        let mut tx = entry_fee_row(dec!(10.00), dec!(0.50));
        tx.fail("card declined", Utc::now()).unwrap();
        assert_eq!(tx.failure_reason.as_deref(), Some("card declined"));
        assert!(tx.status.is_terminal());
    }

    #[test]
    fn invariants_catch_tampered_net() {
        let mut tx = entry_fee_row(dec!(10.00), dec!(0.50));
        tx.net_amount = dec!(9.60);
        assert!(matches!(
            tx.check_invariants(),
            Err(LedgerError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn invariants_reject_sub_cent_amount() {
        let tx = entry_fee_row(dec!(0.001), Decimal::ZERO);
        assert!(tx.check_invariants().is_err());
    }

    #[test]
    fn update_cannot_touch_amounts() {
        let committed = entry_fee_row(dec!(10.00), dec!(0.50));
        let mut edited = committed.clone();
        edited.amount = dec!(11.00);
        edited.net_amount = dec!(10.50);
        let err = edited.check_update_from(&committed).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ImmutableFieldChanged { field: "amount", .. }
        ));
    }

    #[test]
    fn update_must_follow_status_machine() {
        let mut committed = entry_fee_row(dec!(10.00), dec!(0.50));
        committed.fail("declined", Utc::now()).unwrap();
        let mut edited = committed.clone();
        edited.status = TransactionStatus::Completed;
        assert!(matches!(
            edited.check_update_from(&committed),
            Err(LedgerError::InvalidTransactionTransition { .. })
        ));
    }

    #[test]
    fn metadata_is_tagged() {
        let meta = TransactionMetadata::Refund {
            original_transaction_id: TransactionId::new(),
            reason: "duplicate charge".into(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "REFUND");
        assert_eq!(meta.transaction_type(), TransactionType::Refund);
        assert_eq!(meta.tournament_id(), None);
    }
}
