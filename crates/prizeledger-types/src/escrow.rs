//! Per-tournament custody of prize funds.
//!
//! Custody invariant, checked before every commit:
//! ```text
//! locked + released <= total   (1-cent tolerance)
//! locked, released, total >= 0
//! ```
//! `locked` grows only through funding and shrinks only through a
//! successful payout; `released` only grows.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{ESCROW_TOLERANCE, MAX_ESCROW_RELEASE_DAYS};
use crate::money::round_cents;
use crate::{EscrowAccountId, EscrowId, LedgerError, Result, TournamentId};

/// Lifecycle of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    Pending,
    Locked,
    Releasing,
    Completed,
    Disputed,
}

impl EscrowStatus {
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Locked)
                | (Self::Locked, Self::Releasing | Self::Completed | Self::Disputed)
                | (Self::Releasing, Self::Locked | Self::Completed)
                | (Self::Disputed, Self::Locked)
        )
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Locked => "LOCKED",
            Self::Releasing => "RELEASING",
            Self::Completed => "COMPLETED",
            Self::Disputed => "DISPUTED",
        };
        f.write_str(name)
    }
}

/// Custody record for one tournament's prize money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeEscrow {
    pub id: EscrowId,
    pub tournament_id: TournamentId,
    pub total_amount: Decimal,
    pub locked_amount: Decimal,
    pub released_amount: Decimal,
    pub escrow_account_id: EscrowAccountId,
    pub status: EscrowStatus,
    pub lock_date: DateTime<Utc>,
    pub release_date: DateTime<Utc>,
    pub dispute_details: Option<String>,
}

impl PrizeEscrow {
    /// A freshly created escrow: everything it holds is locked. The release
    /// horizon is clamped to `[0, MAX_ESCROW_RELEASE_DAYS]`.
    #[must_use]
    pub fn locked(
        tournament_id: TournamentId,
        total_amount: Decimal,
        release_after_days: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let total_amount = round_cents(total_amount);
        Self {
            id: EscrowId::new(),
            tournament_id,
            total_amount,
            locked_amount: total_amount,
            released_amount: Decimal::ZERO,
            escrow_account_id: EscrowAccountId::generate(tournament_id),
            status: EscrowStatus::Locked,
            lock_date: now,
            release_date: now
                + Duration::days(release_after_days.clamp(0, MAX_ESCROW_RELEASE_DAYS)),
            dispute_details: None,
        }
    }

    /// Amount still available to pay out.
    #[must_use]
    pub fn available(&self) -> Decimal {
        self.locked_amount
    }

    pub fn ensure_status(&self, expected: EscrowStatus) -> Result<()> {
        if self.status != expected {
            return Err(LedgerError::EscrowWrongStatus {
                tournament: self.tournament_id,
                status: self.status,
                expected,
            });
        }
        Ok(())
    }

    fn transition(&mut self, target: EscrowStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(LedgerError::EscrowWrongStatus {
                tournament: self.tournament_id,
                status: self.status,
                expected: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// Add funded money: both total and locked grow.
    pub fn fund(&mut self, amount: Decimal) {
        let amount = round_cents(amount);
        self.total_amount += amount;
        self.locked_amount += amount;
    }

    /// Move `amount` from locked to released. Drained escrows complete.
    pub fn release(&mut self, amount: Decimal) -> Result<()> {
        self.ensure_status(EscrowStatus::Locked)?;
        let amount = round_cents(amount);
        if self.locked_amount < amount {
            return Err(LedgerError::InsufficientEscrowFunds {
                tournament: self.tournament_id,
                requested: amount,
                locked: self.locked_amount,
            });
        }
        self.locked_amount -= amount;
        self.released_amount += amount;
        if self.locked_amount.is_zero() {
            self.transition(EscrowStatus::Completed)?;
        }
        Ok(())
    }

    pub fn open_dispute(&mut self, details: impl Into<String>) -> Result<()> {
        self.ensure_status(EscrowStatus::Locked)?;
        self.transition(EscrowStatus::Disputed)?;
        self.dispute_details = Some(details.into());
        Ok(())
    }

    /// Back to LOCKED; the dispute text is kept for the audit trail.
    pub fn resolve_dispute(&mut self) -> Result<()> {
        self.ensure_status(EscrowStatus::Disputed)?;
        self.transition(EscrowStatus::Locked)
    }

    /// Custody invariant checked before every commit.
    pub fn check_invariants(&self) -> Result<()> {
        let violation =
            |reason: String| -> Result<()> { Err(LedgerError::InvariantViolation { reason }) };

        for (field, value) in [
            ("total_amount", self.total_amount),
            ("locked_amount", self.locked_amount),
            ("released_amount", self.released_amount),
        ] {
            if value < Decimal::ZERO {
                return violation(format!(
                    "escrow {}: {field} is negative ({value})",
                    self.tournament_id
                ));
            }
        }
        if self.locked_amount + self.released_amount > self.total_amount + ESCROW_TOLERANCE {
            return violation(format!(
                "escrow {}: locked {} + released {} exceeds total {}",
                self.tournament_id, self.locked_amount, self.released_amount, self.total_amount
            ));
        }
        Ok(())
    }

    /// Compare against the committed version of the same escrow.
    pub fn check_update_from(&self, committed: &Self) -> Result<()> {
        if self.id != committed.id
            || self.tournament_id != committed.tournament_id
            || self.escrow_account_id != committed.escrow_account_id
        {
            return Err(LedgerError::InvariantViolation {
                reason: format!("escrow {}: identity fields changed", committed.tournament_id),
            });
        }
        if self.released_amount < committed.released_amount {
            return Err(LedgerError::InvariantViolation {
                reason: format!(
                    "escrow {}: released amount decreased from {} to {}",
                    self.tournament_id, committed.released_amount, self.released_amount
                ),
            });
        }
        if self.total_amount < committed.total_amount {
            return Err(LedgerError::InvariantViolation {
                reason: format!("escrow {}: total amount decreased", self.tournament_id),
            });
        }
        Ok(())
    }
}
