//! Escrow conservation checker.
//!
//! Invariants verified from committed state, per tournament:
//! ```text
//! locked + released <= total            (± 0.01)
//! released == Σ amount(PRIZE_PAYOUT rows for the tournament,
//!                      status ∈ {COMPLETED, REFUNDED})
//! ```
//!
//! A refunded payout still counts as released: refunds never put money
//! back into escrow.

use std::sync::Arc;

use prizeledger_store::{LedgerStore, TransactionFilter};
use prizeledger_types::{
    LedgerError, Result, TournamentId, TransactionStatus, TransactionType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConservationReport {
    pub tournament_id: TournamentId,
    pub total_amount: Decimal,
    pub locked_amount: Decimal,
    pub released_amount: Decimal,
    /// Sum of settled PRIZE_PAYOUT rows for the tournament.
    pub paid_out: Decimal,
    pub payout_count: usize,
}

pub struct EscrowConservation<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> EscrowConservation<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// # Errors
    /// Returns [`LedgerError::InvariantViolation`] when either invariant
    /// fails; the message carries both sides of the broken equation.
    pub fn verify(&self, tournament_id: TournamentId) -> Result<ConservationReport> {
        let escrow = self
            .store
            .escrow(tournament_id)
            .ok_or(LedgerError::EscrowNotFound(tournament_id))?;
        escrow.check_invariants()?;

        let filter = TransactionFilter::new()
            .of_type(TransactionType::PrizePayout)
            .with_status(TransactionStatus::Completed)
            .with_status(TransactionStatus::Refunded);
        let settled: Vec<_> = self
            .store
            .transactions(&filter)
            .into_iter()
            .filter(|tx| tx.metadata.tournament_id() == Some(tournament_id))
            .collect();
        let paid_out: Decimal = settled.iter().map(|tx| tx.amount).sum();

        if paid_out != escrow.released_amount {
            tracing::error!(
                tournament = %tournament_id,
                released = %escrow.released_amount,
                paid_out = %paid_out,
                "Escrow conservation violated"
            );
            return Err(LedgerError::InvariantViolation {
                reason: format!(
                    "escrow {tournament_id}: released {} != settled payouts {paid_out} ({} rows)",
                    escrow.released_amount,
                    settled.len()
                ),
            });
        }

        Ok(ConservationReport {
            tournament_id,
            total_amount: escrow.total_amount,
            locked_amount: escrow.locked_amount,
            released_amount: escrow.released_amount,
            paid_out,
            payout_count: settled.len(),
        })
    }

    /// Verify every escrow in the store; stops at the first violation.
    pub fn verify_all(&self) -> Result<Vec<ConservationReport>> {
        self.store
            .escrows()
            .into_iter()
            .map(|escrow| self.verify(escrow.tournament_id))
            .collect()
    }
}
